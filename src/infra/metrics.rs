// ============================================================
// Layer 6 — Metrics Table
// ============================================================
// One row per epoch, kept in memory and rewritten in full to
// `<run_dir>/metrics.csv` after every epoch. A crash leaves a
// complete table up to the last finished epoch.
//
// The file is first written to `metrics.csv.tmp` and then
// renamed over the old table, so readers never see a
// half-written file.
//
// Example CSV output:
//   epoch,kld_loss,kld_weighted,train_loss,val_loss,mean_qed,mean_fp_recon
//   9,0.412,0.0412,1.873,1.902,,
//   10,0.398,0.0398,1.851,1.889,0.41,0.27
//
// Quality columns are empty except on scoring epochs.
//
// Reference: Rust Book §12 (I/O and File Handling)

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::error::{GenError, GenResult};

pub const METRICS_FILE: &str = "metrics.csv";
pub const HEADER: &str = "epoch,kld_loss,kld_weighted,train_loss,val_loss,mean_qed,mean_fp_recon";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub epoch:         usize,
    /// KLD of the last batch of the epoch
    pub kld_loss:      f64,
    /// `kld_loss` after weighting (and annealing when enabled)
    pub kld_weighted:  f64,
    pub train_loss:    f64,
    pub val_loss:      f64,
    pub mean_qed:      Option<f64>,
    pub mean_fp_recon: Option<f64>,
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

impl MetricsRow {
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.epoch,
            self.kld_loss,
            self.kld_weighted,
            self.train_loss,
            self.val_loss,
            opt(self.mean_qed),
            opt(self.mean_fp_recon),
        )
    }

    pub fn from_csv(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() != 7 {
            anyhow::bail!("expected 7 fields, found {}", fields.len());
        }
        let num = |i: usize| -> Result<f64> {
            fields[i]
                .parse::<f64>()
                .with_context(|| format!("bad number '{}' in column {}", fields[i], i + 1))
        };
        let optional = |i: usize| -> Result<Option<f64>> {
            if fields[i].is_empty() { Ok(None) } else { num(i).map(Some) }
        };
        Ok(Self {
            epoch:         fields[0].parse().with_context(|| format!("bad epoch '{}'", fields[0]))?,
            kld_loss:      num(1)?,
            kld_weighted:  num(2)?,
            train_loss:    num(3)?,
            val_loss:      num(4)?,
            mean_qed:      optional(5)?,
            mean_fp_recon: optional(6)?,
        })
    }
}

/// Ordered rows plus the path they are flushed to.
pub struct MetricsTable {
    csv_path: PathBuf,
    rows:     Vec<MetricsRow>,
}

impl MetricsTable {
    /// Empty table in `dir`.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        Ok(Self { csv_path: dir.join(METRICS_FILE), rows: Vec::new() })
    }

    /// Table for a run resumed at `start_epoch`: rows of earlier
    /// epochs are reloaded from an existing `metrics.csv`.
    pub fn resume(dir: &Path, start_epoch: usize) -> Result<Self> {
        let mut table = Self::new(dir)?;
        if start_epoch == 0 || !table.csv_path.is_file() {
            return Ok(table);
        }
        let text = fs::read_to_string(&table.csv_path)
            .with_context(|| format!("Cannot read '{}'", table.csv_path.display()))?;
        for (n, line) in text.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let row = MetricsRow::from_csv(line)
                .with_context(|| format!("{}:{}", table.csv_path.display(), n + 1))?;
            if row.epoch < start_epoch {
                table.rows.push(row);
            }
        }
        tracing::info!(
            "Resumed metrics table with {} rows before epoch {}",
            table.rows.len(),
            start_epoch
        );
        Ok(table)
    }

    pub fn push(&mut self, row: MetricsRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[MetricsRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Rewrite the whole table (temp file + rename).
    pub fn flush(&self) -> GenResult<()> {
        let tmp = self.csv_path.with_extension("csv.tmp");
        let mut f = fs::File::create(&tmp).map_err(GenError::resource(&tmp))?;
        writeln!(f, "{HEADER}").map_err(GenError::resource(&tmp))?;
        for row in &self.rows {
            writeln!(f, "{}", row.to_csv()).map_err(GenError::resource(&tmp))?;
        }
        f.sync_all().map_err(GenError::resource(&tmp))?;
        drop(f);
        fs::rename(&tmp, &self.csv_path).map_err(GenError::resource(&self.csv_path))?;

        tracing::debug!("Wrote {} metrics rows to '{}'", self.rows.len(), self.csv_path.display());
        Ok(())
    }
}
