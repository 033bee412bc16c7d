// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration     (Layer 2)
//   Step 2: Prepare the run directory      (Layer 6 - infra)
//   Step 3: Load + split the dataset       (Layer 4 - data)
//   Step 4: Vectorize into datasets        (Layer 4 - data)
//   Step 5: Load the fingerprint keys      (Layer 4 - chem)
//   Step 6: Build the model, resume        (Layer 5 - ml)
//   Step 7: Run the training loop          (Layer 5 - ml)
//
// The backend is chosen once here: Autodiff<Wgpu> with
// --use-gpu, Autodiff<NdArray> otherwise.
//
// Reference: Burn Book §5 (Training)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    module::Module,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::chem::{FingerprintKeyTable, GraphToolkit};
use crate::data::{
    dataset::{FpDataset, FpSample},
    splitter::{cached_split, sample_fraction, SCORING_FRACTION},
    vectorizer::{SelfiesVectorizer, DEFAULT_PAD_TO_LEN},
};
use crate::domain::error::{GenError, GenResult};
use crate::infra::checkpoint::{load_model_from, CheckpointManager};
use crate::ml::{
    annealing::AnnealingShape,
    model::{EncoderActivation, EncoderDecoderConfig},
    scoring::{InvalidMoleculePolicy, ScoringPipeline},
    trainer::{ensure_fresh_epochs, TrainingLoop},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Saved as
// hyperparameters.json beside the checkpoints and reloaded by `score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    // Run
    pub run_name:            String,
    pub data_path:           String,
    pub models_dir:          String,
    pub keys_path:           String,
    pub alphabet_path:       Option<String>,
    pub resume_from:         Option<String>,
    pub use_gpu:             bool,

    // Data
    pub train_size:          f64,
    pub random_seed:         u64,
    pub batch_size:          usize,
    pub num_workers:         usize,
    pub pad_to_len:          usize,

    // Optimisation
    pub epochs:              usize,
    pub start_epoch:         usize,
    pub learn_rate:          f64,
    pub kld_weight:          f64,
    pub kld_backward:        bool,
    pub kld_annealing:       bool,
    pub annealing_max_epoch: usize,
    pub annealing_shape:     AnnealingShape,
    pub resume_annealing:    bool,

    // Model
    pub fp_len:              usize,
    pub encoding_size:       usize,
    pub hidden_size:         usize,
    pub num_layers:          usize,
    pub dropout:             f64,
    pub teacher_ratio:       f64,
    pub fc1_size:            usize,
    pub fc2_size:            usize,
    pub fc3_size:            usize,
    pub encoder_activation:  EncoderActivation,

    // Scoring
    pub invalid_policy:      InvalidMoleculePolicy,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            run_name:            "gru_vae".to_string(),
            data_path:           "data/train_data/dataset.jsonl".to_string(),
            models_dir:          "models".to_string(),
            keys_path:           "data/KlekFP_keys.txt".to_string(),
            alphabet_path:       None,
            resume_from:         None,
            use_gpu:             false,

            train_size:          0.8,
            random_seed:         42,
            batch_size:          256,
            num_workers:         1,
            pad_to_len:          DEFAULT_PAD_TO_LEN,

            epochs:              150,
            start_epoch:         1,
            learn_rate:          2e-4,
            kld_weight:          0.1,
            kld_backward:        true,
            kld_annealing:       true,
            annealing_max_epoch: 30,
            annealing_shape:     AnnealingShape::Cosine,
            resume_annealing:    false,

            fp_len:              4860,
            encoding_size:       32,
            hidden_size:         512,
            num_layers:          1,
            dropout:             0.2,
            teacher_ratio:       0.5,
            fc1_size:            1024,
            fc2_size:            1024,
            fc3_size:            512,
            encoder_activation:  EncoderActivation::Relu,

            invalid_policy:      InvalidMoleculePolicy::ZeroScore,
        }
    }
}

impl TrainConfig {
    /// Reject hyperparameters the run could not complete with.
    pub fn validate(&self) -> GenResult<()> {
        let fail = |msg: String| Err(GenError::Config(msg));

        if self.run_name.is_empty() || self.run_name.contains(['/', '\\']) {
            return fail(format!("run_name '{}' must be a plain directory name", self.run_name));
        }
        if !(self.train_size > 0.0 && self.train_size < 1.0) {
            return fail(format!("train_size must be in (0, 1), got {}", self.train_size));
        }
        if self.epochs == 0 {
            return fail("epochs must be at least 1".into());
        }
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1".into());
        }
        if self.pad_to_len < 2 {
            return fail("pad_to_len must leave room for [start] and [end]".into());
        }
        if !(self.learn_rate.is_finite() && self.learn_rate > 0.0) {
            return fail(format!("learn_rate must be positive, got {}", self.learn_rate));
        }
        if !(self.kld_weight.is_finite() && self.kld_weight >= 0.0) {
            return fail(format!("kld_weight must be non-negative, got {}", self.kld_weight));
        }
        if self.kld_annealing && self.annealing_max_epoch == 0 {
            return fail("annealing_max_epoch must be at least 1 when annealing".into());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if !(0.0..=1.0).contains(&self.teacher_ratio) {
            return fail(format!("teacher_ratio must be in [0, 1], got {}", self.teacher_ratio));
        }
        let sizes = [
            ("fp_len", self.fp_len),
            ("encoding_size", self.encoding_size),
            ("hidden_size", self.hidden_size),
            ("num_layers", self.num_layers),
            ("fc1_size", self.fc1_size),
            ("fc2_size", self.fc2_size),
            ("fc3_size", self.fc3_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return fail(format!("{name} must be at least 1"));
        }
        Ok(())
    }

    /// Model architecture for an alphabet of `output_size` symbols.
    pub fn model_config(&self, output_size: usize) -> EncoderDecoderConfig {
        EncoderDecoderConfig::new(
            self.fp_len,
            self.encoding_size,
            self.hidden_size,
            self.num_layers,
            output_size,
            self.fc1_size,
            self.fc2_size,
            self.fc3_size,
        )
        .with_dropout(self.dropout)
        .with_teacher_ratio(self.teacher_ratio)
        .with_encoder_activation(self.encoder_activation)
    }

    pub fn vectorizer(&self) -> Result<SelfiesVectorizer> {
        match &self.alphabet_path {
            Some(path) => SelfiesVectorizer::from_file(Path::new(path), self.pad_to_len),
            None => Ok(SelfiesVectorizer::default().with_pad_to_len(self.pad_to_len)),
        }
    }

    pub fn scoring_pipeline(&self, vectorizer: SelfiesVectorizer) -> Result<ScoringPipeline<GraphToolkit>> {
        let keys = FingerprintKeyTable::load(Path::new(&self.keys_path), &GraphToolkit, self.fp_len)?;
        Ok(ScoringPipeline::new(GraphToolkit, keys, vectorizer, self.invalid_policy))
    }

    pub fn run_dir(&self) -> PathBuf {
        Path::new(&self.models_dir).join(&self.run_name)
    }
}

// ─── Prepared data ───────────────────────────────────────────────────────────
/// Backend-independent inputs of a run.
pub struct PreparedData {
    pub vectorizer: SelfiesVectorizer,
    pub train:      FpDataset,
    pub val:        FpDataset,
    pub scoring:    FpDataset,
}

/// Load, split and vectorize the dataset of `cfg`.
pub fn prepare_data(cfg: &TrainConfig) -> Result<PreparedData> {
    let vectorizer = cfg.vectorizer()?;
    let data_path  = Path::new(&cfg.data_path);

    let (train_samples, val_samples) = cached_split(data_path, cfg.train_size, cfg.random_seed)
        .with_context(|| format!("Preparing dataset '{}'", data_path.display()))?;
    if train_samples.is_empty() {
        return Err(GenError::config(format!("no training records in '{}'", data_path.display())).into());
    }
    let scoring_samples: Vec<FpSample> =
        sample_fraction(&val_samples, SCORING_FRACTION, cfg.random_seed);
    tracing::info!(
        "Split: {} train, {} validation, {} scoring",
        train_samples.len(),
        val_samples.len(),
        scoring_samples.len()
    );

    Ok(PreparedData {
        train:   FpDataset::from_samples(&train_samples, &vectorizer, cfg.fp_len)?,
        val:     FpDataset::from_samples(&val_samples, &vectorizer, cfg.fp_len)?,
        scoring: FpDataset::from_samples(&scoring_samples, &vectorizer, cfg.fp_len)?,
        vectorizer,
    })
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Run directory + hyperparameters ──────────────────────────
        let ckpt = CheckpointManager::new(Path::new(&cfg.models_dir), &cfg.run_name)?;
        ensure_fresh_epochs(cfg, &ckpt)?;
        ckpt.save_config(cfg)?;

        // ── Steps 3-4: Dataset, split, vectorize ──────────────────────────────
        let data = prepare_data(cfg)?;

        // ── Step 5: Fingerprint keys + scoring ────────────────────────────────
        let scoring = cfg.scoring_pipeline(data.vectorizer.clone())?;

        // ── Steps 6-7: Model + training loop on the chosen backend ───────────
        if cfg.use_gpu {
            fit::<Autodiff<Wgpu>>(cfg, WgpuDevice::default(), data, &scoring, &ckpt)
        } else {
            fit::<Autodiff<NdArray>>(cfg, Default::default(), data, &scoring, &ckpt)
        }
    }
}

fn fit<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    device:  B::Device,
    data:    PreparedData,
    scoring: &ScoringPipeline<GraphToolkit>,
    ckpt:    &CheckpointManager,
) -> Result<()> {
    let mut model = cfg.model_config(data.vectorizer.alphabet_len()).init::<B>(&device);
    tracing::info!("Model parameters: {}", model.num_params());

    if let Some(path) = &cfg.resume_from {
        model = load_model_from(model, Path::new(path), &device)
            .with_context(|| format!("Resuming from '{path}'"))?;
    }

    let mut training = TrainingLoop::<B, _>::new(cfg, device, scoring, ckpt)?;
    training.run(model, data.train, data.val, data.scoring)?;
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::save_samples;
    use burn::data::dataset::Dataset;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let bad = [
            TrainConfig { epochs: 0, ..Default::default() },
            TrainConfig { batch_size: 0, ..Default::default() },
            TrainConfig { train_size: 1.0, ..Default::default() },
            TrainConfig { learn_rate: f64::NAN, ..Default::default() },
            TrainConfig { kld_weight: -1.0, ..Default::default() },
            TrainConfig { annealing_max_epoch: 0, ..Default::default() },
            TrainConfig { dropout: 1.0, ..Default::default() },
            TrainConfig { fp_len: 0, ..Default::default() },
            TrainConfig { run_name: "a/b".into(), ..Default::default() },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(GenError::Config(_))), "{cfg:?}");
        }
        let no_anneal = TrainConfig { kld_annealing: false, annealing_max_epoch: 0, ..Default::default() };
        assert!(no_anneal.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip_fills_missing_fields() {
        let cfg: TrainConfig = serde_json::from_str(r#"{"run_name":"x","annealing_shape":"logistic"}"#).unwrap();
        assert_eq!(cfg.run_name, "x");
        assert_eq!(cfg.annealing_shape, AnnealingShape::Logistic);
        assert_eq!(cfg.fp_len, TrainConfig::default().fp_len);
    }

    #[test]
    fn test_model_config_carries_hyperparameters() {
        let cfg = TrainConfig { dropout: 0.3, teacher_ratio: 0.9, ..Default::default() };
        let m = cfg.model_config(31);
        assert_eq!(m.output_size, 31);
        assert_eq!(m.fp_len, cfg.fp_len);
        assert_eq!(m.dropout, 0.3);
        assert_eq!(m.teacher_ratio, 0.9);
    }

    #[test]
    fn test_refused_run_keeps_saved_hyperparameters() {
        let dir = tempfile::tempdir().unwrap();
        let models_dir = dir.path().to_string_lossy().into_owned();
        let first = TrainConfig { run_name: "kept".into(), models_dir: models_dir.clone(), fp_len: 4, ..Default::default() };
        let ckpt = CheckpointManager::new(dir.path(), "kept").unwrap();
        ckpt.save_config(&first).unwrap();
        let model = EncoderDecoderConfig::new(4, 2, 4, 1, 31, 4, 4, 4).init::<NdArray>(&Default::default());
        ckpt.save_model(&model, 10).unwrap();

        let second = TrainConfig { learn_rate: 1e-3, ..first.clone() };
        let err = TrainUseCase::new(second).execute().unwrap_err();
        assert!(matches!(err.downcast_ref::<GenError>(), Some(GenError::Config(_))));
        assert_eq!(ckpt.load_config().unwrap(), first);
    }

    #[test]
    fn test_scoring_pipeline_holds_keys_for_the_run() {
        use crate::domain::fingerprint::Fingerprint;

        let dir  = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys.txt");
        std::fs::write(&keys, "C\nO\nN\nS\n").unwrap();
        let cfg = TrainConfig { keys_path: keys.to_string_lossy().into_owned(), fp_len: 4, ..Default::default() };

        let pipeline = cfg.scoring_pipeline(SelfiesVectorizer::default()).unwrap();
        std::fs::remove_file(&keys).unwrap();
        assert!(cfg.scoring_pipeline(SelfiesVectorizer::default()).is_err());

        let mol = pipeline.decode("[C][O]").unwrap();
        let fp  = Fingerprint::from_indices(&[0, 2], 4);
        assert!((pipeline.fingerprint_score(&mol, &fp).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_prepare_data_splits_and_samples() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.jsonl");
        let samples: Vec<FpSample> = (0..50).map(|i| FpSample::new("[C][O]", vec![i % 4])).collect();
        save_samples(&path, &samples).unwrap();

        let cfg = TrainConfig {
            data_path: path.to_string_lossy().into_owned(),
            fp_len:    4,
            pad_to_len: 8,
            ..Default::default()
        };
        let data = prepare_data(&cfg).unwrap();
        assert_eq!(data.train.len(), 40);
        assert_eq!(data.val.len(), 10);
        assert_eq!(data.scoring.len(), 1);
        assert!(dir.path().join("set_train_80.jsonl").is_file());
    }
}
