// ============================================================
// Layer 4 — Fingerprint / SELFIES Dataset
// ============================================================
// Records are read from a JSON-lines file, one object per line:
//
//   {"selfies": "[C][C][O]", "fps": [0, 17, 211]}
//
// `fps` lists the indices of the set fingerprint bits. Every
// record is vectorized once when the dataset is built, so a
// bad record fails the run before training starts.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::vectorizer::SelfiesVectorizer;
use crate::domain::error::{GenError, GenResult};
use crate::domain::fingerprint::Fingerprint;

/// One raw dataset record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpSample {
    pub selfies: String,
    pub fps:     Vec<usize>,
}

impl FpSample {
    pub fn new(selfies: impl Into<String>, fps: Vec<usize>) -> Self {
        Self { selfies: selfies.into(), fps }
    }
}

/// One vectorized sample, ready for the batcher.
#[derive(Debug, Clone)]
pub struct FpItem {
    /// Dense 0/1 fingerprint, length fp_len
    pub fingerprint: Vec<f32>,
    /// Alphabet indices, length pad_to_len
    pub tokens:      Vec<usize>,
}

pub struct FpDataset {
    items: Vec<FpItem>,
}

impl FpDataset {
    pub fn new(items: Vec<FpItem>) -> Self { Self { items } }

    pub fn from_samples(
        samples:    &[FpSample],
        vectorizer: &SelfiesVectorizer,
        fp_len:     usize,
    ) -> GenResult<Self> {
        let items = samples
            .iter()
            .enumerate()
            .map(|(row, s)| {
                if let Some(&bad) = s.fps.iter().find(|&&i| i >= fp_len) {
                    return Err(GenError::config(format!(
                        "record {row}: bit {bad} out of range for fp_len {fp_len}"
                    )));
                }
                Ok(FpItem {
                    fingerprint: Fingerprint::from_indices(&s.fps, fp_len).to_dense(),
                    tokens:      vectorizer.vectorize(&s.selfies)?,
                })
            })
            .collect::<GenResult<Vec<_>>>()?;
        Ok(Self { items })
    }
}

impl Dataset<FpItem> for FpDataset {
    fn get(&self, index: usize) -> Option<FpItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

// ─── JSON-lines I/O ───────────────────────────────────────────────────────────
pub fn load_samples(path: &Path) -> Result<Vec<FpSample>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open dataset '{}'", path.display()))?;
    let mut samples = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Cannot read '{}'", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: FpSample = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: malformed record", path.display(), n + 1))?;
        samples.push(sample);
    }
    tracing::info!("Loaded {} records from {}", samples.len(), path.display());
    Ok(samples)
}

pub fn save_samples(path: &Path, samples: &[FpSample]) -> Result<()> {
    let file = std::fs::File::create(path)
        .map_err(GenError::resource(path))?;
    let mut out = std::io::BufWriter::new(file);
    for s in samples {
        serde_json::to_writer(&mut out, s)?;
        out.write_all(b"\n")
            .map_err(GenError::resource(path))?;
    }
    out.flush()
        .map_err(GenError::resource(path))?;
    Ok(())
}
