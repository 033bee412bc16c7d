// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything a run leaves on disk:
//
//   checkpoint.rs — model weights (Burn CompactRecorder) and the
//                   run's TrainConfig as hyperparameters.json
//
//   metrics.rs    — per-epoch metrics table, rewritten in full
//                   to metrics.csv after every epoch
//
// Reference: Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV table
pub mod metrics;
