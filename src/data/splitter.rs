// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Scaffold split of the dataset, cached on disk next to the
// source file so every run with the same train fraction sees
// the same split:
//
//   data/set.jsonl  →  data/set_train_80.jsonl
//                      data/set_val_20.jsonl
//
// Records are grouped by the Bemis–Murcko scaffold of their
// decoded SELFIES, so no scaffold appears on both sides. Groups
// larger than half the validation size are placed first, the
// rest follow in seeded shuffled order; a group joins training
// while it still fits under the train size, otherwise it goes to
// validation. Records that do not decode form their own group
// of one. If either side ends up empty the plain seeded random
// split is used instead.
//
// The scoring subset is a seeded 10% sample of the validation
// records.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom with a
// StdRng seeded from the configured random seed.
//
// Reference: rand crate documentation

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Result;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::chem::{scaffold::scaffold_key, GraphToolkit};
use crate::data::dataset::{load_samples, save_samples, FpSample};
use crate::domain::traits::MoleculeToolkit;

/// Fraction of validation records used for scoring.
pub const SCORING_FRACTION: f64 = 0.1;

/// Shuffle `samples` with `seed` and split into (train, validation).
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);
    let val      = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}

/// Split by Bemis–Murcko scaffold into (train, validation).
pub fn scaffold_split(samples: Vec<FpSample>, train_fraction: f64, seed: u64) -> (Vec<FpSample>, Vec<FpSample>) {
    let total     = samples.len();
    let train_cap = (((total as f64) * train_fraction).round() as usize).min(total);
    let val_size  = total - train_cap;

    let mut by_scaffold: BTreeMap<String, Vec<FpSample>> = BTreeMap::new();
    let mut singletons: Vec<Vec<FpSample>> = Vec::new();
    for sample in samples {
        match GraphToolkit.decode(&sample.selfies) {
            Ok(mol) => by_scaffold.entry(scaffold_key(&mol)).or_default().push(sample),
            Err(e) => {
                tracing::debug!("No scaffold for '{}': {}", sample.selfies, e);
                singletons.push(vec![sample]);
            }
        }
    }
    tracing::debug!(
        "{} scaffolds, {} undecodable records",
        by_scaffold.len(),
        singletons.len()
    );

    let (mut big, mut small): (Vec<_>, Vec<_>) = by_scaffold
        .into_values()
        .chain(singletons)
        .partition(|group| group.len() * 2 > val_size);
    let mut rng = StdRng::seed_from_u64(seed);
    big.shuffle(&mut rng);
    small.shuffle(&mut rng);

    let mut train = Vec::with_capacity(train_cap);
    let mut val   = Vec::with_capacity(val_size);
    for group in big.into_iter().chain(small) {
        if train.len() + group.len() <= train_cap {
            train.extend(group);
        } else {
            val.extend(group);
        }
    }

    if total >= 2 && (train.is_empty() || val.is_empty()) {
        tracing::warn!(
            "Scaffold split left one side empty ({} / {}); using a random split",
            train.len(),
            val.len()
        );
        train.append(&mut val);
        return split_train_val(train, train_fraction, seed);
    }
    (train, val)
}

/// Seeded sample of `fraction` of `samples` (rounded), without replacement.
pub fn sample_fraction<T: Clone>(samples: &[T], fraction: f64, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = ((samples.len() as f64) * fraction).round() as usize;
    samples.choose_multiple(&mut rng, n).cloned().collect()
}

/// Percentages used in the cache file names: (train, val).
pub fn split_percentages(train_fraction: f64) -> (u32, u32) {
    let train = (train_fraction * 100.0).round() as u32;
    (train, 100u32.saturating_sub(train))
}

/// `<dir>/<stem>_<tag>_<pct>.jsonl`
pub fn cache_path(data_path: &Path, tag: &str, percent: u32) -> PathBuf {
    let stem = data_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".into());
    data_path.with_file_name(format!("{stem}_{tag}_{percent}.jsonl"))
}

/// Load the cached split if both files exist, otherwise split
/// `data_path` and write the cache.
pub fn cached_split(data_path: &Path, train_fraction: f64, seed: u64) -> Result<(Vec<FpSample>, Vec<FpSample>)> {
    let (train_pct, val_pct) = split_percentages(train_fraction);
    let train_path = cache_path(data_path, "train", train_pct);
    let val_path   = cache_path(data_path, "val", val_pct);

    if train_path.is_file() && val_path.is_file() {
        tracing::info!("Using cached split {}", train_path.display());
        return Ok((load_samples(&train_path)?, load_samples(&val_path)?));
    }

    let (train, val) = scaffold_split(load_samples(data_path)?, train_fraction, seed);
    save_samples(&train_path, &train)?;
    save_samples(&val_path, &val)?;
    tracing::info!("Split complete: {} train / {} val", train.len(), val.len());
    Ok((train, val))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_train_val(items, 0.8, 42);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_split_is_deterministic() {
        let a = split_train_val((0..50).collect::<Vec<usize>>(), 0.7, 7);
        let b = split_train_val((0..50).collect::<Vec<usize>>(), 0.7, 7);
        assert_eq!(a, b);
        assert_eq!(a.0.len() + a.1.len(), 50);
    }

    #[test]
    fn test_empty_dataset() {
        let (train, val) = split_train_val(Vec::<usize>::new(), 0.8, 0);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }

    const BENZENE:     &str = "[C][=C][C][=C][C][=C][Ring1][=Branch1]";
    const TOLUENE:     &str = "[C][C][=C][C][=C][C][=C][Ring1][=Branch1]";
    const CYCLOHEXANE: &str = "[C][C][C][C][C][C][Ring1][=Branch1]";

    fn scaffold_of(sample: &FpSample) -> String {
        GraphToolkit
            .decode(&sample.selfies)
            .map(|m| scaffold_key(&m))
            .unwrap_or_else(|_| sample.selfies.clone())
    }

    fn mixed_set() -> Vec<FpSample> {
        let mut samples = Vec::new();
        for i in 0..6 {
            samples.push(FpSample::new(BENZENE, vec![i]));
            samples.push(FpSample::new(TOLUENE, vec![i]));
        }
        for i in 0..4 {
            samples.push(FpSample::new(CYCLOHEXANE, vec![i]));
            samples.push(FpSample::new("[C][O]", vec![i]));
            samples.push(FpSample::new("[C][C][O]", vec![i]));
        }
        samples
    }

    #[test]
    fn test_scaffolds_do_not_cross_the_split() {
        let (train, val) = scaffold_split(mixed_set(), 0.5, 11);
        assert_eq!(train.len() + val.len(), 24);
        assert!(!train.is_empty() && !val.is_empty());
        for t in &train {
            assert!(val.iter().all(|v| scaffold_of(v) != scaffold_of(t)));
        }
    }

    #[test]
    fn test_scaffold_split_is_deterministic() {
        assert_eq!(scaffold_split(mixed_set(), 0.5, 3), scaffold_split(mixed_set(), 0.5, 3));
    }

    #[test]
    fn test_single_scaffold_falls_back_to_random_split() {
        let samples: Vec<FpSample> = (0..10).map(|i| FpSample::new(BENZENE, vec![i])).collect();
        let (train, val) = scaffold_split(samples, 0.8, 5);
        assert_eq!((train.len(), val.len()), (8, 2));
    }

    #[test]
    fn test_undecodable_records_still_split() {
        let mut samples = mixed_set();
        samples.push(FpSample::new("[Xyz]", vec![0]));
        let (train, val) = scaffold_split(samples, 0.5, 2);
        assert_eq!(train.len() + val.len(), 25);
    }

    #[test]
    fn test_sample_fraction() {
        let items: Vec<usize> = (0..40).collect();
        let subset = sample_fraction(&items, SCORING_FRACTION, 3);
        assert_eq!(subset.len(), 4);
        assert_eq!(subset, sample_fraction(&items, SCORING_FRACTION, 3));
    }

    #[test]
    fn test_cache_path_names() {
        let p = cache_path(Path::new("data/set.jsonl"), "train", 80);
        assert_eq!(p, PathBuf::from("data/set_train_80.jsonl"));
        assert_eq!(split_percentages(0.8), (80, 20));
    }

    #[test]
    fn test_cached_split_reuses_files() {
        let dir  = tempfile::tempdir().unwrap();
        let data = dir.path().join("set.jsonl");
        let samples: Vec<FpSample> = (0..10).map(|i| FpSample::new("[C]", vec![i % 4])).collect();
        save_samples(&data, &samples).unwrap();

        let first = cached_split(&data, 0.8, 1).unwrap();
        assert!(cache_path(&data, "train", 80).is_file());

        std::fs::remove_file(&data).unwrap();
        let second = cached_split(&data, 0.8, 99).unwrap();
        assert_eq!(first, second);
    }
}
