// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch state machine:
//
//   TrainingEpoch → Validating → [Scoring] → Persisting → [Checkpointing]
//        ▲                                                      │
//        └──────────────── next epoch / Done ◀──────────────────┘
//
//   TrainingEpoch  teacher-forced forward on the autodiff backend,
//                  loss + (annealed) weighted KLD, Adam step
//   Validating     free-running forward on the inner backend
//   Scoring        epoch % 10 == 0: QED + fingerprint recovery
//   Persisting     append a MetricsRow, rewrite metrics.csv
//   Checkpointing  epoch % 10 == 0: epoch_<n>.mpk
//
// The metrics row carries the KLD of the last batch of the
// epoch; the epoch mean is returned in EpochStats and logged.
// Any error aborts the run; metrics written so far stay on disk.
// A run whose epoch range would reach an existing checkpoint is
// refused before the first epoch. Teacher forcing draws from a
// StdRng seeded with `random_seed`.
//
// Burn notes:
//   - Training uses B (Autodiff<...>) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - Validation / scoring batchers use B::InnerBackend too
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::time::Instant;

use anyhow::{Context, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, SeedableRng};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{FpBatch, FpBatcher},
    dataset::FpDataset,
};
use crate::domain::error::{GenError, GenResult};
use crate::domain::traits::MoleculeToolkit;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsRow, MetricsTable},
};
use crate::ml::{
    annealing::AnnealingSchedule,
    loss::ReconstructionLoss,
    model::EncoderDecoder,
    scoring::{ScoreSummary, ScoringPipeline},
};

/// Scoring and checkpointing happen on epochs divisible by this.
pub const SCORE_EVERY: usize = 10;

pub fn is_scoring_epoch(epoch: usize) -> bool {
    epoch % SCORE_EVERY == 0
}

/// Fails when a checkpoint the run would write already exists.
pub fn ensure_fresh_epochs(cfg: &TrainConfig, ckpt: &CheckpointManager) -> GenResult<()> {
    let epochs = cfg.start_epoch..cfg.start_epoch + cfg.epochs;
    match epochs.filter(|e| is_scoring_epoch(*e)).find(|e| ckpt.exists(*e)) {
        Some(taken) => Err(GenError::config(format!(
            "checkpoint for epoch {taken} already exists in '{}'; choose another run name or start epoch",
            ckpt.run_dir().display()
        ))),
        None => Ok(()),
    }
}

// ─── Epoch statistics ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatchStats {
    pub loss:         f64,
    pub kld_loss:     f64,
    pub kld_weighted: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub mean_train_loss: f64,
    pub mean_kld_loss:   f64,
    pub last_batch:      BatchStats,
    pub batches:         usize,
}

// ─── TrainingLoop ─────────────────────────────────────────────────────────────
pub struct TrainingLoop<'a, B: AutodiffBackend, T: MoleculeToolkit> {
    cfg:       &'a TrainConfig,
    device:    B::Device,
    scoring:   &'a ScoringPipeline<T>,
    ckpt:      &'a CheckpointManager,
    metrics:   MetricsTable,
    annealing: Option<AnnealingSchedule>,
    criterion: ReconstructionLoss,
    rng:       StdRng,
}

impl<'a, B: AutodiffBackend, T: MoleculeToolkit> TrainingLoop<'a, B, T> {
    pub fn new(
        cfg:     &'a TrainConfig,
        device:  B::Device,
        scoring: &'a ScoringPipeline<T>,
        ckpt:    &'a CheckpointManager,
    ) -> Result<Self> {
        ensure_fresh_epochs(cfg, ckpt)?;

        let annealing = if cfg.kld_annealing {
            let schedule = AnnealingSchedule::new(cfg.annealing_max_epoch, cfg.annealing_shape)?;
            let counter  = if cfg.resume_annealing { cfg.start_epoch } else { 0 };
            Some(schedule.with_counter(counter))
        } else {
            None
        };
        let metrics = MetricsTable::resume(ckpt.run_dir(), cfg.start_epoch)?;
        Ok(Self {
            cfg,
            device,
            scoring,
            ckpt,
            metrics,
            annealing,
            criterion: ReconstructionLoss::new(),
            rng:       StdRng::seed_from_u64(cfg.random_seed),
        })
    }

    pub fn metrics(&self) -> &MetricsTable {
        &self.metrics
    }

    /// Train `model` for the configured epochs; returns the trained model.
    pub fn run(
        &mut self,
        mut model:       EncoderDecoder<B>,
        train_dataset:   FpDataset,
        val_dataset:     FpDataset,
        scoring_dataset: FpDataset,
    ) -> Result<EncoderDecoder<B>> {
        let cfg = self.cfg;
        B::seed(cfg.random_seed);

        // ── Adam optimiser ────────────────────────────────────────────────────
        let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

        // ── Training data loader (AutodiffBackend) ────────────────────────────
        let train_loader = DataLoaderBuilder::new(FpBatcher::<B>::new(self.device.clone()))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.random_seed)
            .num_workers(cfg.num_workers)
            .build(train_dataset);

        // ── Validation / scoring loaders (InnerBackend, no autodiff) ──────────
        let val_loader = DataLoaderBuilder::new(FpBatcher::<B::InnerBackend>::new(self.device.clone()))
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .build(val_dataset);
        let scoring_loader = DataLoaderBuilder::new(FpBatcher::<B::InnerBackend>::new(self.device.clone()))
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .build(scoring_dataset);

        let first = cfg.start_epoch;
        let last  = cfg.start_epoch + cfg.epochs;
        tracing::info!("Training epochs {}..{} on {:?}", first, last, self.device);

        for epoch in first..last {
            let started = Instant::now();

            // ── TrainingEpoch ─────────────────────────────────────────────────
            let (trained, stats) = self.train_epoch(model, &mut optim, train_loader.as_ref(), epoch)?;
            model = trained;
            tracing::info!(
                "Epoch {}: mean KLD {:.4} (last batch {:.4})",
                epoch, stats.mean_kld_loss, stats.last_batch.kld_loss
            );

            // ── Validating ────────────────────────────────────────────────────
            let model_valid = model.valid();
            let val_loss = self.validate(&model_valid, val_loader.as_ref());

            // ── Scoring ───────────────────────────────────────────────────────
            let scores: Option<ScoreSummary> = if is_scoring_epoch(epoch) {
                let t0 = Instant::now();
                let summary = self.scoring.run(&model_valid, scoring_loader.iter())?;
                tracing::info!(
                    "QED + fp evaluated in {:.2} min ({:.1}% valid)",
                    t0.elapsed().as_secs_f64() / 60.0,
                    summary.valid_fraction * 100.0
                );
                Some(summary)
            } else {
                None
            };

            let row = MetricsRow {
                epoch,
                kld_loss:      stats.last_batch.kld_loss,
                kld_weighted:  stats.last_batch.kld_weighted,
                train_loss:    stats.mean_train_loss,
                val_loss,
                mean_qed:      scores.map(|s| s.mean_qed),
                mean_fp_recon: scores.map(|s| s.mean_fp_recon),
            };

            if let Some(schedule) = self.annealing.as_mut() {
                schedule.advance();
            }

            // ── Persisting / Checkpointing ────────────────────────────────────
            self.metrics.push(row);
            if is_scoring_epoch(epoch) && !self.ckpt.save_model(&model, epoch)? {
                return Err(GenError::config(format!("checkpoint for epoch {epoch} appeared during the run")).into());
            }
            self.metrics
                .flush()
                .with_context(|| format!("Persisting metrics for epoch {epoch}"))?;

            println!(
                "Epoch {:>3} | train_loss={:.4} | val_loss={:.4} | kld={:.4} | kld_weighted={:.4}{} | {:.2} min",
                epoch,
                stats.mean_train_loss,
                val_loss,
                stats.last_batch.kld_loss,
                stats.last_batch.kld_weighted,
                scores
                    .map(|s| format!(" | qed={:.3} | fp_recon={:.3}", s.mean_qed, s.mean_fp_recon))
                    .unwrap_or_default(),
                started.elapsed().as_secs_f64() / 60.0,
            );
        }

        tracing::info!("Training complete!");
        Ok(model)
    }

    /// One pass over the training loader.
    pub fn train_epoch<O>(
        &mut self,
        mut model: EncoderDecoder<B>,
        optim:     &mut O,
        loader:    &dyn DataLoader<FpBatch<B>>,
        epoch:     usize,
    ) -> Result<(EncoderDecoder<B>, EpochStats)>
    where
        O: Optimizer<EncoderDecoder<B>, B>,
    {
        let cfg = self.cfg;
        let mut loss_sum = 0.0f64;
        let mut kld_sum  = 0.0f64;
        let mut batches  = 0usize;
        let mut last     = BatchStats::default();

        for batch in loader.iter() {
            let output = model.forward(batch.fingerprints, batch.targets.clone(), Some(&mut self.rng));
            let loss   = self.criterion.compute(batch.targets, output.probs);

            let mut kld_weighted = output.kld.clone().mul_scalar(cfg.kld_weight);
            if let Some(schedule) = &self.annealing {
                kld_weighted = schedule.weight(kld_weighted);
            }

            last = BatchStats {
                loss:         loss.clone().into_scalar().elem::<f64>(),
                kld_loss:     output.kld.into_scalar().elem::<f64>(),
                kld_weighted: kld_weighted.clone().into_scalar().elem::<f64>(),
            };
            if !last.loss.is_finite() {
                return Err(GenError::NonFiniteLoss { what: "train", epoch }.into());
            }

            // Backward pass + Adam update
            let objective = if cfg.kld_backward { loss + kld_weighted } else { loss };
            let grads = objective.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.learn_rate, model, grads);

            loss_sum += last.loss;
            kld_sum  += last.kld_loss;
            batches  += 1;
        }

        if batches == 0 {
            return Err(GenError::config("training set produced no batches").into());
        }

        let stats = EpochStats {
            mean_train_loss: loss_sum / batches as f64,
            mean_kld_loss:   kld_sum / batches as f64,
            last_batch:      last,
            batches,
        };
        Ok((model, stats))
    }

    /// Mean free-running reconstruction loss; NaN when the loader is empty.
    pub fn validate(
        &self,
        model:  &EncoderDecoder<B::InnerBackend>,
        loader: &dyn DataLoader<FpBatch<B::InnerBackend>>,
    ) -> f64 {
        let mut sum     = 0.0f64;
        let mut batches = 0usize;
        for batch in loader.iter() {
            let output = model.forward(batch.fingerprints, batch.targets.clone(), None);
            sum += self
                .criterion
                .compute(batch.targets, output.probs)
                .into_scalar()
                .elem::<f64>();
            batches += 1;
        }
        if batches == 0 {
            tracing::warn!("Validation loader produced no batches");
            return f64::NAN;
        }
        sum / batches as f64
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::FingerprintKeyTable;
    use crate::data::dataset::FpSample;
    use crate::data::vectorizer::{SelfiesVectorizer, DEFAULT_ALPHABET};
    use crate::ml::scoring::{tests::TextToolkit, InvalidMoleculePolicy};
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataset::Dataset;

    type B = Autodiff<NdArray>;

    fn vectorizer() -> SelfiesVectorizer {
        SelfiesVectorizer::new(DEFAULT_ALPHABET.iter().map(|s| s.to_string()).collect(), 6)
    }

    fn config(run: &str, start_epoch: usize, epochs: usize) -> TrainConfig {
        TrainConfig {
            run_name:      run.into(),
            fp_len:        4,
            encoding_size: 2,
            hidden_size:   4,
            num_layers:    1,
            fc1_size:      4,
            fc2_size:      4,
            fc3_size:      4,
            pad_to_len:    6,
            batch_size:    4,
            num_workers:   1,
            kld_weight:    0.5,
            kld_annealing: false,
            start_epoch,
            epochs,
            random_seed:   7,
            ..TrainConfig::default()
        }
    }

    fn dataset(samples: &[FpSample]) -> FpDataset {
        FpDataset::from_samples(samples, &vectorizer(), 4).unwrap()
    }

    fn samples() -> Vec<FpSample> {
        vec![
            FpSample::new("[C][O]", vec![0, 2]),
            FpSample::new("[C][N]", vec![0, 1]),
        ]
    }

    fn pipeline() -> ScoringPipeline<TextToolkit> {
        let keys = FingerprintKeyTable::from_patterns(
            ["[C]", "[N]", "[O]", "[S]"].iter().map(|p| Some(p.to_string())).collect(),
        );
        ScoringPipeline::new(TextToolkit { qed: 0.6 }, keys, vectorizer(), InvalidMoleculePolicy::ZeroScore)
    }

    fn try_train(cfg: &TrainConfig, dir: &std::path::Path, train_set: FpDataset) -> Result<CheckpointManager> {
        let device  = Default::default();
        let scoring = pipeline();
        let ckpt    = CheckpointManager::new(dir, &cfg.run_name)?;
        let model   = cfg.model_config(31).init::<B>(&device);
        {
            let mut lp = TrainingLoop::<B, _>::new(cfg, device, &scoring, &ckpt)?;
            lp.run(model, train_set, dataset(&samples()), dataset(&samples()))?;
        }
        Ok(ckpt)
    }

    fn train(cfg: &TrainConfig, dir: &std::path::Path) -> (MetricsTable, CheckpointManager) {
        let ckpt    = try_train(cfg, dir, dataset(&samples())).unwrap();
        let metrics = MetricsTable::resume(ckpt.run_dir(), usize::MAX).unwrap();
        (metrics, ckpt)
    }

    #[test]
    fn test_single_epoch_single_batch() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("a", 1, 1);
        let (metrics, _) = train(&cfg, dir.path());

        assert_eq!(metrics.len(), 1);
        let row = &metrics.rows()[0];
        assert_eq!(row.epoch, 1);
        assert!((row.kld_weighted - row.kld_loss * cfg.kld_weight).abs() < 1e-6);
        assert!(row.train_loss.is_finite());
        assert!(row.val_loss.is_finite());
        assert!(row.mean_qed.is_none());
    }

    #[test]
    fn test_scores_present_only_on_scoring_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let (metrics, _) = train(&config("b", 9, 3), dir.path());

        let epochs: Vec<usize> = metrics.rows().iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![9, 10, 11]);
        for row in metrics.rows() {
            assert_eq!(row.mean_qed.is_some(), row.epoch % 10 == 0, "epoch {}", row.epoch);
            assert_eq!(row.mean_qed.is_some(), row.mean_fp_recon.is_some());
        }
    }

    #[test]
    fn test_checkpoint_count_is_floor_n_over_10() {
        let dir = tempfile::tempdir().unwrap();
        let (_, ckpt) = train(&config("c", 1, 21), dir.path());
        assert_eq!(ckpt.saved_epochs().unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_annealed_kld_is_zero_in_first_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig { kld_annealing: true, annealing_max_epoch: 5, ..config("d", 1, 2) };
        let (metrics, _) = train(&cfg, dir.path());
        assert_eq!(metrics.rows()[0].kld_weighted, 0.0);
        let second = &metrics.rows()[1];
        assert!(second.kld_weighted <= second.kld_loss * cfg.kld_weight + 1e-6);
    }

    #[test]
    fn test_kld_tracked_when_not_backpropagated() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig { kld_backward: false, ..config("e", 1, 2) };
        let (metrics, _) = train(&cfg, dir.path());
        for row in metrics.rows() {
            assert!(row.kld_loss.is_finite());
            assert!((row.kld_weighted - row.kld_loss * cfg.kld_weight).abs() < 1e-6);
        }
    }

    #[test]
    fn test_non_finite_loss_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("f", 1, 3);
        let clean = dataset(&samples());
        let poisoned = FpDataset::new(
            (0..clean.len())
                .filter_map(|i| clean.get(i))
                .map(|mut item| {
                    item.fingerprint[0] = f32::NAN;
                    item
                })
                .collect(),
        );

        let err = try_train(&cfg, dir.path(), poisoned).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenError>(),
            Some(GenError::NonFiniteLoss { what: "train", epoch: 1 })
        ));
        let written = MetricsTable::resume(&dir.path().join("f"), usize::MAX).unwrap();
        assert!(written.is_empty());
    }

    #[test]
    fn test_resumed_annealing_starts_from_start_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let base = TrainConfig { kld_annealing: true, annealing_max_epoch: 5, ..config("g", 5, 1) };

        let fresh = TrainConfig { resume_annealing: false, ..base.clone() };
        let (metrics, _) = train(&fresh, dir.path());
        assert_eq!(metrics.rows()[0].kld_weighted, 0.0);

        // counter starts at 5 = max epoch: full weight from the first row
        let resumed = TrainConfig { run_name: "g2".into(), resume_annealing: true, ..base };
        let (metrics, _) = train(&resumed, dir.path());
        let row = &metrics.rows()[0];
        assert!((row.kld_weighted - row.kld_loss * resumed.kld_weight).abs() < 1e-6);
    }

    #[test]
    fn test_existing_checkpoint_refuses_new_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("h", 1, 10);
        train(&cfg, dir.path());

        let err = try_train(&cfg, dir.path(), dataset(&samples())).unwrap_err();
        assert!(matches!(err.downcast_ref::<GenError>(), Some(GenError::Config(_))));

        // a later range that stays clear of epoch 10 is allowed
        let later = config("h", 11, 2);
        assert!(try_train(&later, dir.path(), dataset(&samples())).is_ok());
    }

    #[test]
    fn test_scoring_epoch_rule() {
        assert!(is_scoring_epoch(0));
        assert!(is_scoring_epoch(30));
        assert!(!is_scoring_epoch(31));
    }
}
