// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder
// and keeps the run's hyperparameters beside them.
//
// Run directory layout:
//   <models_dir>/<run_name>/
//     hyperparameters.json   ← TrainConfig of the run
//     metrics.csv            ← written by MetricsTable
//     epoch_0.mpk            ← weights after epoch 0
//     epoch_10.mpk
//     ...
//
// A checkpoint is never overwritten: saving an epoch whose file
// already exists logs a warning and leaves the old file alone.
// Nothing is ever deleted.
//
// Burn's CompactRecorder:
//   - Serialises model parameters to MessagePack format
//   - Half precision floats, file extension chosen by the recorder
//   - Type-safe: loading fails if architecture doesn't match
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use burn::{
    backend::NdArray,
    prelude::*,
    record::{CompactRecorder, FileRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::error::GenError;
use crate::ml::model::EncoderDecoder;

pub const HYPERPARAMETERS_FILE: &str = "hyperparameters.json";

/// Extension the recorder appends to every checkpoint stem.
pub fn checkpoint_extension() -> &'static str {
    <CompactRecorder as FileRecorder<NdArray>>::file_extension()
}

#[derive(Debug)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Manager for `<models_dir>/<run_name>`; creates the directory.
    pub fn new(models_dir: &Path, run_name: &str) -> Result<Self> {
        let dir = models_dir.join(run_name);
        fs::create_dir_all(&dir)
            .map_err(GenError::resource(&dir))
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Manager for an existing run; never creates anything.
    pub fn open(models_dir: &Path, run_name: &str) -> Result<Self> {
        let dir = models_dir.join(run_name);
        if !dir.is_dir() {
            bail!(
                "Run directory '{}' does not exist. Check --run-name and --models-dir",
                dir.display()
            );
        }
        Ok(Self { dir })
    }

    pub fn run_dir(&self) -> &Path {
        &self.dir
    }

    /// Path without extension (the recorder appends it).
    fn stem(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("epoch_{epoch}"))
    }

    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("epoch_{epoch}.{}", checkpoint_extension()))
    }

    pub fn exists(&self, epoch: usize) -> bool {
        self.checkpoint_path(epoch).is_file()
    }

    /// Epochs that have a checkpoint file, ascending.
    pub fn saved_epochs(&self) -> Result<Vec<usize>> {
        let suffix = format!(".{}", checkpoint_extension());
        let mut epochs: Vec<usize> = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot list '{}'", self.dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_prefix("epoch_")?
                    .strip_suffix(suffix.as_str())?
                    .parse()
                    .ok()
            })
            .collect();
        epochs.sort_unstable();
        Ok(epochs)
    }

    /// Save weights for `epoch`. Returns false when a checkpoint
    /// for that epoch already exists and was left untouched.
    pub fn save_model<B: Backend>(&self, model: &EncoderDecoder<B>, epoch: usize) -> Result<bool> {
        if self.exists(epoch) {
            tracing::warn!(
                "Checkpoint '{}' already exists; not overwriting",
                self.checkpoint_path(epoch).display()
            );
            return Ok(false);
        }
        let path = self.stem(epoch);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
        Ok(true)
    }

    /// Load weights of `epoch` from this run into `model`.
    pub fn load_model<B: Backend>(
        &self,
        model:  EncoderDecoder<B>,
        epoch:  usize,
        device: &B::Device,
    ) -> Result<EncoderDecoder<B>> {
        load_model_from(model, &self.stem(epoch), device)
    }

    /// Save the run's hyperparameters as pretty JSON.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(HYPERPARAMETERS_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .map_err(GenError::resource(&path))
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved hyperparameters to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(HYPERPARAMETERS_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read '{}'. Has this run been trained?",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed hyperparameters in '{}'", path.display()))
    }
}

/// Load weights from an explicit checkpoint path (with or
/// without the recorder's extension).
pub fn load_model_from<B: Backend>(
    model:  EncoderDecoder<B>,
    path:   &Path,
    device: &B::Device,
) -> Result<EncoderDecoder<B>> {
    let text = path.to_string_lossy();
    let stem = text
        .strip_suffix(&format!(".{}", checkpoint_extension()))
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf());

    tracing::info!("Loading checkpoint '{}'", stem.display());
    let record = CompactRecorder::new()
        .load(stem.clone(), device)
        .with_context(|| format!("Cannot load checkpoint '{}'", stem.display()))?;
    Ok(model.load_record(record))
}
