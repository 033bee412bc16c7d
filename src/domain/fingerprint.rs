// ============================================================
// Layer 3 — Fingerprint Domain Type
// ============================================================
// A fixed-length binary vector. Bit i asserts the presence of
// the substructure registered at position i of the key table.
//
// On disk a fingerprint is stored sparsely as the list of set
// bit indices; the model consumes the dense 0/1 form.
//
// Example (fp_len = 4):
//   sparse [0, 2]  ↔  dense [1, 0, 1, 0]

use serde::{Deserialize, Serialize};

use crate::domain::error::{GenError, GenResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    bits: Vec<bool>,
}

impl Fingerprint {
    /// Build from the indices of set bits. Indices past `len` are dropped.
    pub fn from_indices(indices: &[usize], len: usize) -> Self {
        let mut bits = vec![false; len];
        for &i in indices {
            if i < len {
                bits[i] = true;
            } else {
                tracing::debug!("Fingerprint index {} outside length {}", i, len);
            }
        }
        Self { bits }
    }

    /// Build from a dense row, treating any value above 0.5 as set.
    pub fn from_dense(values: &[f32]) -> Self {
        Self { bits: values.iter().map(|&v| v > 0.5).collect() }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn set_bits(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().filter(|(_, b)| **b).map(|(i, _)| i)
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Dense float row for tensor construction.
    pub fn to_dense(&self) -> Vec<f32> {
        self.bits.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect()
    }

    /// Fraction of set bits for which `matches(bit)` holds.
    /// An all-zero fingerprint has no denominator and is rejected.
    pub fn recovered_fraction(&self, mut matches: impl FnMut(usize) -> bool) -> GenResult<f64> {
        let total = self.count_ones();
        if total == 0 {
            return Err(GenError::DegenerateFingerprint);
        }
        let hit = self.set_bits().filter(|&i| matches(i)).count();
        Ok(hit as f64 / total as f64)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_and_dense_agree() {
        let fp = Fingerprint::from_indices(&[0, 2], 4);
        assert_eq!(fp.to_dense(), vec![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(Fingerprint::from_dense(&[1.0, 0.0, 1.0, 0.0]), fp);
        assert_eq!(fp.count_ones(), 2);
    }

    #[test]
    fn test_out_of_range_index_is_dropped() {
        let fp = Fingerprint::from_indices(&[1, 9], 4);
        assert_eq!(fp.set_bits().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_recovered_fraction() {
        let fp = Fingerprint::from_indices(&[0, 2], 4);
        assert_eq!(fp.recovered_fraction(|i| i == 0).unwrap(), 0.5);
        assert_eq!(fp.recovered_fraction(|_| true).unwrap(), 1.0);
        assert_eq!(fp.recovered_fraction(|_| false).unwrap(), 0.0);
    }

    #[test]
    fn test_all_zero_fingerprint_is_degenerate() {
        let fp = Fingerprint::from_indices(&[], 4);
        assert!(matches!(
            fp.recovered_fraction(|_| true),
            Err(GenError::DegenerateFingerprint)
        ));
    }
}
