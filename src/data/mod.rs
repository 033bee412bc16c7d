// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the JSON-lines dataset file to tensor
// batches.
//
//   dataset.jsonl
//       │
//       ▼
//   splitter        → seeded train / val split (cached on disk)
//       │              + 10% scoring subset of val
//       ▼
//   vectorizer      → SELFIES → padded alphabet indices
//       │
//       ▼
//   FpDataset       → implements Burn's Dataset trait
//       │
//       ▼
//   FpBatcher       → stacks items into tensor batches
//       │
//       ▼
//   DataLoader      → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// SELFIES ↔ alphabet index sequences
pub mod vectorizer;

/// JSON-lines records and Burn's Dataset trait
pub mod dataset;

/// Burn's Batcher trait for fingerprint batches
pub mod batcher;

/// Seeded train/validation split and scoring subset
pub mod splitter;
