// ============================================================
// Layer 4 — Fingerprint Batcher
// ============================================================
// Implements Burn's Batcher trait to stack FpItems into
// tensors on the configured device.
//
//   Input:  Vec of N FpItems (fp_len floats, seq_len indices)
//   Output: FpBatch
//             fingerprints  [N, fp_len]   float 0/1
//             targets       [N, seq_len]  int alphabet indices
//
// Items are already padded to the same length by the
// vectorizer, so stacking is a flatten + reshape.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::FpItem;

// ─── FpBatch ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct FpBatch<B: Backend> {
    /// Shape: [batch_size, fp_len]
    pub fingerprints: Tensor<B, 2>,

    /// Shape: [batch_size, seq_len]
    pub targets: Tensor<B, 2, Int>,
}

// ─── FpBatcher ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct FpBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> FpBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<FpItem, FpBatch<B>> for FpBatcher<B> {
    fn batch(&self, items: Vec<FpItem>) -> FpBatch<B> {
        let batch_size = items.len();
        let fp_len     = items.first().map_or(0, |i| i.fingerprint.len());
        let seq_len    = items.first().map_or(0, |i| i.tokens.len());

        let fp_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.fingerprint.iter().copied())
            .collect();

        let tok_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.tokens.iter().map(|&t| t as i32))
            .collect();

        let fingerprints = Tensor::<B, 1>::from_floats(
            fp_flat.as_slice(), &self.device
        ).reshape([batch_size, fp_len]);

        let targets = Tensor::<B, 1, Int>::from_ints(
            tok_flat.as_slice(), &self.device
        ).reshape([batch_size, seq_len]);

        FpBatch { fingerprints, targets }
    }
}
