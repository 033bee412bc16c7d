// ============================================================
// Layer 5 — Reconstruction Loss
// ============================================================
// Categorical cross-entropy on probabilities (the decoder
// already applies softmax):
//
//   loss = mean over batch and positions of -ln(max(p[target], ε))
//
// Padding positions are included; the decoder learns to emit
// [nop] after [end].
//
// Reference: Burn Book §3 (Tensor operations)

use burn::prelude::*;

/// Lower bound applied to probabilities before the logarithm.
pub const PROB_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconstructionLoss;

impl ReconstructionLoss {
    pub fn new() -> Self {
        Self
    }

    /// targets: [batch, seq_len] indices, probs: [batch, seq_len, alphabet] → scalar
    pub fn compute<B: Backend>(&self, targets: Tensor<B, 2, Int>, probs: Tensor<B, 3>) -> Tensor<B, 1> {
        let index = targets.unsqueeze_dim::<3>(2);
        probs
            .gather(2, index)
            .clamp_min(PROB_EPSILON)
            .log()
            .neg()
            .mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn probs(values: &[f32], dims: [usize; 3]) -> Tensor<B, 3> {
        Tensor::<B, 1>::from_floats(values, &Default::default()).reshape(dims)
    }

    fn targets(values: &[i32], dims: [usize; 2]) -> Tensor<B, 2, Int> {
        Tensor::<B, 1, Int>::from_ints(values, &Default::default()).reshape(dims)
    }

    #[test]
    fn test_uniform_probabilities() {
        let p    = probs(&[1.0 / 3.0; 12], [2, 2, 3]);
        let loss = ReconstructionLoss::new().compute(targets(&[0, 1, 2, 0], [2, 2]), p);
        let v: f64 = loss.into_scalar().elem();
        assert!((v - 3f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_zero_probability_is_bounded() {
        let p    = probs(&[1.0, 0.0], [1, 1, 2]);
        let loss = ReconstructionLoss::new().compute(targets(&[1], [1, 1]), p);
        let v: f64 = loss.into_scalar().elem();
        assert!(v.is_finite());
        assert!((v + PROB_EPSILON.ln()).abs() < 1e-2);
    }

    #[test]
    fn test_invariant_to_batch_permutation() {
        let rows: [[f32; 6]; 3] = [
            [0.7, 0.2, 0.1, 0.3, 0.3, 0.4],
            [0.1, 0.8, 0.1, 0.5, 0.25, 0.25],
            [0.2, 0.2, 0.6, 0.05, 0.9, 0.05],
        ];
        let tgt: [[i32; 2]; 3] = [[0, 2], [1, 0], [2, 1]];

        let flat = |order: [usize; 3]| {
            let p: Vec<f32> = order.iter().flat_map(|&i| rows[i]).collect();
            let t: Vec<i32> = order.iter().flat_map(|&i| tgt[i]).collect();
            let loss = ReconstructionLoss::new()
                .compute(targets(&t, [3, 2]), probs(&p, [3, 2, 3]));
            loss.into_scalar().elem::<f64>()
        };

        let a = flat([0, 1, 2]);
        let b = flat([2, 0, 1]);
        assert!((a - b).abs() < 1e-6);
    }
}
