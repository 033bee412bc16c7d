// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal each:
//
//   train_use_case — validate config, split data, run the
//                    TrainingLoop on the chosen backend
//   score_use_case — reload a run's checkpoint and score it
//
// No tensor math here; only workflow coordination.

pub mod train_use_case;

pub mod score_use_case;
