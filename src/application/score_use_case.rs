// ============================================================
// Layer 2 — Score Use Case
// ============================================================
// Re-scores a saved checkpoint:
//   1. Reload hyperparameters.json of the run
//   2. Rebuild the model and load epoch_<n>
//   3. One free-running pass over the scoring subset
//
// Runs on the plain (non-autodiff) backend.

use std::path::Path;

use anyhow::{Context, Result};
use burn::{
    backend::{wgpu::WgpuDevice, NdArray, Wgpu},
    data::dataloader::DataLoaderBuilder,
    prelude::Backend,
};

use crate::application::train_use_case::{prepare_data, TrainConfig};
use crate::chem::GraphToolkit;
use crate::data::batcher::FpBatcher;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::scoring::{ScoreSummary, ScoringPipeline};

pub struct ScoreUseCase {
    config: TrainConfig,
    ckpt:   CheckpointManager,
    epoch:  usize,
}

impl ScoreUseCase {
    pub fn new(models_dir: &str, run_name: &str, epoch: usize) -> Result<Self> {
        let ckpt   = CheckpointManager::open(Path::new(models_dir), run_name)?;
        let config = ckpt.load_config()?;
        if !ckpt.exists(epoch) {
            anyhow::bail!(
                "No checkpoint for epoch {} in '{}' (saved: {:?})",
                epoch,
                ckpt.run_dir().display(),
                ckpt.saved_epochs()?
            );
        }
        Ok(Self { config, ckpt, epoch })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn score(&self) -> Result<ScoreSummary> {
        if self.config.use_gpu {
            self.score_on::<Wgpu>(WgpuDevice::default())
        } else {
            self.score_on::<NdArray>(Default::default())
        }
    }

    fn score_on<B: Backend>(&self, device: B::Device) -> Result<ScoreSummary> {
        let cfg     = &self.config;
        let data    = prepare_data(cfg)?;
        let scoring: ScoringPipeline<GraphToolkit> = cfg.scoring_pipeline(data.vectorizer.clone())?;

        let model = cfg.model_config(data.vectorizer.alphabet_len()).init::<B>(&device);
        let model = self
            .ckpt
            .load_model(model, self.epoch, &device)
            .with_context(|| format!("Loading epoch {} of '{}'", self.epoch, cfg.run_name))?;

        let loader = DataLoaderBuilder::new(FpBatcher::<B>::new(device))
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .build(data.scoring);

        scoring.run(&model, loader.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::EncoderDecoderConfig;

    #[test]
    fn test_missing_checkpoint_is_reported() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path(), "run").unwrap();
        ckpt.save_config(&TrainConfig { run_name: "run".into(), ..Default::default() }).unwrap();

        let models_dir = dir.path().to_string_lossy().into_owned();
        let err = ScoreUseCase::new(&models_dir, "run", 10).err().unwrap();
        assert!(err.to_string().contains("No checkpoint for epoch 10"));
    }

    #[test]
    fn test_unknown_run_leaves_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let models_dir = dir.path().to_string_lossy().into_owned();

        let err = ScoreUseCase::new(&models_dir, "typo_run", 10).err().unwrap();
        assert!(err.to_string().contains("does not exist"));
        assert!(!dir.path().join("typo_run").exists());
    }

    #[test]
    fn test_loads_saved_config() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path(), "run").unwrap();
        let cfg  = TrainConfig { run_name: "run".into(), fp_len: 4, ..Default::default() };
        ckpt.save_config(&cfg).unwrap();
        let model = EncoderDecoderConfig::new(4, 2, 4, 1, 31, 4, 4, 4).init::<NdArray>(&Default::default());
        ckpt.save_model(&model, 10).unwrap();

        let models_dir = dir.path().to_string_lossy().into_owned();
        let uc = ScoreUseCase::new(&models_dir, "run", 10).unwrap();
        assert_eq!(uc.config(), &cfg);
    }
}
