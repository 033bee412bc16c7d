// ============================================================
// Layer 5 — Scoring Pipeline
// ============================================================
// Turns generated probabilities back into molecules and scores
// them against the fingerprints they were generated from.
//
//   probs [B, S, A] ──argmax──▶ indices ──devectorize──▶ SELFIES
//        ──toolkit.decode──▶ Molecule | invalid
//
//   quality   = QED(mol)
//   fp_recon  = |{i : fp[i] = 1 ∧ mol ⊇ key[i]}| / |{i : fp[i] = 1}|
//
// Aggregation is a mean of batch means: molecules are averaged
// within each batch, then batch means over the pass.
//
// Local failures never abort the pass:
//   decode failure      → invalid molecule (policy decides its weight)
//   all-zero fingerprint → fp_recon 0 for that molecule
//   unparseable key     → that bit never matches
//
// Runs on the inner backend (`model.valid()`), so no gradients
// are tracked.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::chem::FingerprintKeyTable;
use crate::data::batcher::FpBatch;
use crate::data::vectorizer::SelfiesVectorizer;
use crate::domain::error::{GenError, GenResult};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::traits::MoleculeToolkit;
use crate::ml::model::EncoderDecoder;

// ─── Policy ───────────────────────────────────────────────────────────────────
/// How molecules that failed to decode enter the batch means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidMoleculePolicy {
    /// Count in the denominator with a score of 0.
    #[default]
    ZeroScore,
    /// Leave out of the denominator; a batch with no valid molecule scores 0.
    Exclude,
}

impl FromStr for InvalidMoleculePolicy {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero-score" | "zero" => Ok(InvalidMoleculePolicy::ZeroScore),
            "exclude"             => Ok(InvalidMoleculePolicy::Exclude),
            other => Err(GenError::config(format!("unknown invalid-molecule policy '{other}'"))),
        }
    }
}

impl fmt::Display for InvalidMoleculePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidMoleculePolicy::ZeroScore => f.write_str("zero-score"),
            InvalidMoleculePolicy::Exclude   => f.write_str("exclude"),
        }
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchScore {
    pub mean_qed:      f64,
    pub mean_fp_recon: f64,
    pub valid:         usize,
    pub total:         usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreSummary {
    pub mean_qed:       f64,
    pub mean_fp_recon:  f64,
    /// Pooled over every scored molecule
    pub valid_fraction: f64,
    pub batches:        usize,
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────
pub struct ScoringPipeline<T: MoleculeToolkit> {
    toolkit:    T,
    keys:       FingerprintKeyTable<T::Pattern>,
    vectorizer: SelfiesVectorizer,
    policy:     InvalidMoleculePolicy,
}

impl<T: MoleculeToolkit> ScoringPipeline<T> {
    pub fn new(
        toolkit:    T,
        keys:       FingerprintKeyTable<T::Pattern>,
        vectorizer: SelfiesVectorizer,
        policy:     InvalidMoleculePolicy,
    ) -> Self {
        Self { toolkit, keys, vectorizer, policy }
    }

    pub fn policy(&self) -> InvalidMoleculePolicy {
        self.policy
    }

    /// SELFIES → molecule; `None` when any decode step fails.
    pub fn decode(&self, selfies: &str) -> Option<T::Molecule> {
        match self.toolkit.decode(selfies) {
            Ok(mol) => Some(mol),
            Err(e) if e.is_local() => {
                tracing::debug!("Invalid molecule '{}': {}", selfies, e);
                None
            }
            Err(e) => {
                tracing::warn!("Toolkit failure on '{}', scored as invalid: {}", selfies, e);
                None
            }
        }
    }

    /// Fraction of the fingerprint's set bits whose key pattern occurs in `mol`.
    pub fn fingerprint_score(&self, mol: &T::Molecule, fp: &Fingerprint) -> GenResult<f64> {
        fp.recovered_fraction(|bit| {
            self.keys
                .get(bit)
                .is_some_and(|pattern| self.toolkit.has_substructure(mol, pattern))
        })
    }

    /// (qed, fp_recon) for one decoded molecule.
    fn score_molecule(&self, mol: &T::Molecule, fp: &Fingerprint) -> (f64, f64) {
        let qed = self.toolkit.qed(mol).clamp(0.0, 1.0);
        let fp_recon = match self.fingerprint_score(mol, fp) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!("Fingerprint reconstruction scored 0: {}", e);
                0.0
            }
        };
        (qed, fp_recon)
    }

    /// Score one batch of generated SELFIES against their source fingerprints.
    pub fn score_selfies(&self, selfies: &[String], fingerprints: &[Fingerprint]) -> BatchScore {
        let mut qed_sum = 0.0;
        let mut fp_sum  = 0.0;
        let mut valid   = 0usize;
        for (s, fp) in selfies.iter().zip(fingerprints) {
            if let Some(mol) = self.decode(s) {
                let (q, f) = self.score_molecule(&mol, fp);
                qed_sum += q;
                fp_sum  += f;
                valid   += 1;
            }
        }

        let total = selfies.len().min(fingerprints.len());
        let denominator = match self.policy {
            InvalidMoleculePolicy::ZeroScore => total,
            InvalidMoleculePolicy::Exclude   => valid,
        };
        let mean = |sum: f64| if denominator == 0 { 0.0 } else { sum / denominator as f64 };

        BatchScore { mean_qed: mean(qed_sum), mean_fp_recon: mean(fp_sum), valid, total }
    }

    /// probs: [batch, seq_len, alphabet], fingerprints: [batch, fp_len]
    pub fn score_tensors<B: Backend>(
        &self,
        probs:        Tensor<B, 3>,
        fingerprints: Tensor<B, 2>,
    ) -> Result<BatchScore> {
        let [batch_size, seq_len, width] = probs.dims();
        let [_, fp_len]                  = fingerprints.dims();
        if width != self.vectorizer.alphabet_len() {
            return Err(GenError::config(format!(
                "model emits {width} symbols but the alphabet has {}",
                self.vectorizer.alphabet_len()
            ))
            .into());
        }

        let rows: Vec<f32> = probs
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| anyhow!("Cannot read generated symbols: {e:?}"))?;
        let dense: Vec<f32> = fingerprints
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| anyhow!("Cannot read fingerprints: {e:?}"))?;

        let selfies: Vec<String> = rows
            .chunks((seq_len * width).max(1))
            .take(batch_size)
            .map(|molecule| self.vectorizer.devectorize_probs(molecule, true))
            .collect();
        let fps: Vec<Fingerprint> = dense
            .chunks(fp_len.max(1))
            .take(batch_size)
            .map(Fingerprint::from_dense)
            .collect();

        Ok(self.score_selfies(&selfies, &fps))
    }

    /// One free-running pass of `model` over `batches`.
    pub fn run<B, I>(&self, model: &EncoderDecoder<B>, batches: I) -> Result<ScoreSummary>
    where
        B: Backend,
        I: IntoIterator<Item = FpBatch<B>>,
    {
        let mut qed_sum   = 0.0;
        let mut fp_sum    = 0.0;
        let mut valid     = 0usize;
        let mut total     = 0usize;
        let mut n_batches = 0usize;

        for batch in batches {
            let output = model.forward(batch.fingerprints.clone(), batch.targets, None);
            let score  = self.score_tensors(output.probs, batch.fingerprints)?;
            tracing::debug!(
                "Scored batch {}: qed={:.4} fp_recon={:.4} valid={}/{}",
                n_batches, score.mean_qed, score.mean_fp_recon, score.valid, score.total
            );
            qed_sum   += score.mean_qed;
            fp_sum    += score.mean_fp_recon;
            valid     += score.valid;
            total     += score.total;
            n_batches += 1;
        }

        if n_batches == 0 {
            tracing::warn!("Scoring loader produced no batches; scores default to 0");
            return Ok(ScoreSummary::default());
        }

        Ok(ScoreSummary {
            mean_qed:       qed_sum / n_batches as f64,
            mean_fp_recon:  fp_sum / n_batches as f64,
            valid_fraction: if total == 0 { 0.0 } else { valid as f64 / total as f64 },
            batches:        n_batches,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::batcher::FpBatcher;
    use crate::data::dataset::FpItem;
    use crate::ml::model::EncoderDecoderConfig;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    /// Molecules are the SELFIES text itself; a pattern matches when
    /// it occurs as a substring. Strings containing "[Xx]" fail to decode,
    /// strings containing "[Io]" hit a toolkit I/O failure.
    pub(crate) struct TextToolkit {
        pub qed: f64,
    }

    impl MoleculeToolkit for TextToolkit {
        type Molecule = String;
        type Pattern  = String;

        fn selfies_to_smiles(&self, selfies: &str) -> GenResult<String> {
            if selfies.is_empty() || selfies.contains("[Xx]") {
                Err(GenError::decode("undecodable"))
            } else if selfies.contains("[Io]") {
                Err(GenError::resource(std::path::Path::new("toolkit"))(std::io::Error::other("offline")))
            } else {
                Ok(selfies.to_string())
            }
        }

        fn parse_smiles(&self, smiles: &str) -> GenResult<String> {
            Ok(smiles.to_string())
        }

        fn parse_pattern(&self, smarts: &str) -> GenResult<String> {
            if smarts == "!" {
                Err(GenError::Pattern { index: 0, message: "bad".into() })
            } else {
                Ok(smarts.to_string())
            }
        }

        fn qed(&self, _mol: &String) -> f64 {
            self.qed
        }

        fn has_substructure(&self, mol: &String, pattern: &String) -> bool {
            mol.contains(pattern.as_str())
        }
    }

    /// Toolkit for which nothing decodes.
    pub(crate) struct NothingDecodes;

    impl MoleculeToolkit for NothingDecodes {
        type Molecule = ();
        type Pattern  = ();

        fn selfies_to_smiles(&self, _: &str) -> GenResult<String> {
            Err(GenError::decode("never"))
        }
        fn parse_smiles(&self, _: &str) -> GenResult<()> {
            Err(GenError::decode("never"))
        }
        fn parse_pattern(&self, _: &str) -> GenResult<()> {
            Ok(())
        }
        fn qed(&self, _: &()) -> f64 {
            1.0
        }
        fn has_substructure(&self, _: &(), _: &()) -> bool {
            true
        }
    }

    fn keys(patterns: &[&str]) -> FingerprintKeyTable<String> {
        FingerprintKeyTable::from_patterns(
            patterns.iter().map(|p| (*p != "!").then(|| p.to_string())).collect(),
        )
    }

    fn pipeline(policy: InvalidMoleculePolicy) -> ScoringPipeline<TextToolkit> {
        ScoringPipeline::new(
            TextToolkit { qed: 0.8 },
            keys(&["[C]", "[N]", "[O]", "[S]"]),
            SelfiesVectorizer::default(),
            policy,
        )
    }

    fn fp(bits: &[u8]) -> Fingerprint {
        Fingerprint::from_dense(&bits.iter().map(|&b| b as f32).collect::<Vec<_>>())
    }

    #[test]
    fn test_half_of_set_bits_recovered() {
        let p   = pipeline(InvalidMoleculePolicy::ZeroScore);
        let mol = p.decode("[C][F]").unwrap();
        assert_eq!(p.fingerprint_score(&mol, &fp(&[1, 0, 1, 0])).unwrap(), 0.5);
    }

    #[test]
    fn test_all_and_none_recovered() {
        let p = pipeline(InvalidMoleculePolicy::ZeroScore);
        let all  = p.decode("[C][N][O]").unwrap();
        let none = p.decode("[F][Cl]").unwrap();
        assert_eq!(p.fingerprint_score(&all, &fp(&[1, 1, 1, 0])).unwrap(), 1.0);
        assert_eq!(p.fingerprint_score(&none, &fp(&[1, 1, 1, 0])).unwrap(), 0.0);
    }

    #[test]
    fn test_degenerate_fingerprint_scores_zero() {
        let p = pipeline(InvalidMoleculePolicy::ZeroScore);
        let mol = p.decode("[C]").unwrap();
        assert!(matches!(
            p.fingerprint_score(&mol, &fp(&[0, 0, 0, 0])),
            Err(GenError::DegenerateFingerprint)
        ));
        let score = p.score_selfies(&["[C]".into()], &[fp(&[0, 0, 0, 0])]);
        assert_eq!(score.mean_fp_recon, 0.0);
        assert_eq!(score.valid, 1);
    }

    #[test]
    fn test_unparseable_key_never_matches() {
        let p = ScoringPipeline::new(
            TextToolkit { qed: 0.5 },
            keys(&["[C]", "!"]),
            SelfiesVectorizer::default(),
            InvalidMoleculePolicy::ZeroScore,
        );
        let mol = p.decode("[C][N]").unwrap();
        assert_eq!(p.fingerprint_score(&mol, &fp(&[1, 1])).unwrap(), 0.5);
    }

    #[test]
    fn test_all_invalid_batch_is_zero_under_both_policies() {
        for policy in [InvalidMoleculePolicy::ZeroScore, InvalidMoleculePolicy::Exclude] {
            let p = pipeline(policy);
            let score = p.score_selfies(
                &["[Xx]".into(), "".into()],
                &[fp(&[1, 0, 0, 0]), fp(&[0, 1, 0, 0])],
            );
            assert_eq!(score.mean_qed, 0.0, "{policy}");
            assert_eq!(score.mean_fp_recon, 0.0, "{policy}");
            assert_eq!(score.valid, 0);
        }
    }

    #[test]
    fn test_policies_differ_on_mixed_batch() {
        let selfies = ["[C]".to_string(), "[Xx]".to_string()];
        let fps     = [fp(&[1, 0, 0, 0]), fp(&[1, 0, 0, 0])];

        let zero = pipeline(InvalidMoleculePolicy::ZeroScore).score_selfies(&selfies, &fps);
        assert!((zero.mean_qed - 0.4).abs() < 1e-12);
        assert!((zero.mean_fp_recon - 0.5).abs() < 1e-12);

        let excl = pipeline(InvalidMoleculePolicy::Exclude).score_selfies(&selfies, &fps);
        assert!((excl.mean_qed - 0.8).abs() < 1e-12);
        assert!((excl.mean_fp_recon - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_tensors_decodes_argmax() {
        let device = Default::default();
        let p = pipeline(InvalidMoleculePolicy::ZeroScore);
        // one molecule, 2 positions: [C] then [end]
        let mut values = vec![0.0f32; 2 * 31];
        values[3]      = 1.0;
        values[31 + 2] = 1.0;
        let probs = Tensor::<NdArray, 1>::from_floats(values.as_slice(), &device).reshape([1, 2, 31]);
        let fps   = Tensor::<NdArray, 1>::from_floats([1.0f32, 0.0, 1.0, 0.0].as_slice(), &device)
            .reshape([1, 4]);
        let score = p.score_tensors(probs, fps).unwrap();
        assert_eq!(score.valid, 1);
        assert!((score.mean_fp_recon - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_toolkit_failure_counts_as_invalid() {
        let p = pipeline(InvalidMoleculePolicy::ZeroScore);
        assert!(p.decode("[C][Io]").is_none());
        let fps = vec![Fingerprint::from_indices(&[0], 4); 2];
        let score = p.score_selfies(&["[C][Io]".to_string(), "[C][O]".to_string()], &fps);
        assert_eq!(score.valid, 1);
        assert!((score.mean_qed - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_score_tensors_rejects_foreign_alphabet() {
        let device = Default::default();
        let p = pipeline(InvalidMoleculePolicy::ZeroScore);
        let probs = Tensor::<NdArray, 3>::zeros([1, 2, 30], &device);
        let fps   = Tensor::<NdArray, 2>::ones([1, 4], &device);
        let err = p.score_tensors(probs, fps).unwrap_err();
        assert!(matches!(err.downcast_ref::<GenError>(), Some(GenError::Config(_))));
    }

    #[test]
    fn test_run_with_nothing_decoding() {
        let device = Default::default();
        let model  = EncoderDecoderConfig::new(4, 2, 4, 1, 31, 4, 4, 4).init::<NdArray>(&device);
        let batcher = FpBatcher::<NdArray>::new(device);
        let batch = batcher.batch(vec![
            FpItem { fingerprint: vec![1.0, 0.0, 1.0, 0.0], tokens: vec![1, 3, 2, 0] },
            FpItem { fingerprint: vec![0.0, 1.0, 0.0, 0.0], tokens: vec![1, 9, 2, 0] },
        ]);

        for policy in [InvalidMoleculePolicy::ZeroScore, InvalidMoleculePolicy::Exclude] {
            let p = ScoringPipeline::new(
                NothingDecodes,
                FingerprintKeyTable::from_patterns(vec![Some(()); 4]),
                SelfiesVectorizer::default(),
                policy,
            );
            let summary = p.run(&model, vec![batch.clone()]).unwrap();
            assert_eq!(summary.mean_qed, 0.0);
            assert_eq!(summary.mean_fp_recon, 0.0);
            assert_eq!(summary.valid_fraction, 0.0);
            assert_eq!(summary.batches, 1);
        }
    }

    #[test]
    fn test_empty_loader_yields_zeros() {
        let device = Default::default();
        let model  = EncoderDecoderConfig::new(4, 2, 4, 1, 31, 4, 4, 4).init::<NdArray>(&device);
        let p = pipeline(InvalidMoleculePolicy::ZeroScore);
        let summary = p.run(&model, Vec::<FpBatch<NdArray>>::new()).unwrap();
        assert_eq!(summary, ScoreSummary::default());
    }
}
