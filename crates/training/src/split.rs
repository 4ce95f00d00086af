//! Seeded stratified train/test split.

use std::collections::BTreeMap;

use intraday_core::{Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Row indices of each side of a split, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split row indices so each label keeps its share on both sides.
///
/// Each class sends `round(n_c * test_ratio)` rows to the test side,
/// clamped so both sides keep at least one row of the class. The same
/// labels, ratio and seed always give the same split.
pub fn stratified_split(labels: &[u8], test_ratio: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(Error::config(format!(
            "test ratio must be in (0, 1), got {test_ratio}"
        )));
    }

    let mut classes: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        classes.entry(label).or_default().push(i);
    }

    if classes.len() < 2 {
        return Err(Error::class_balance(format!(
            "need at least two label classes, found {} across {} rows",
            classes.len(),
            labels.len()
        )));
    }
    if let Some((label, rows)) = classes.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(Error::class_balance(format!(
            "class {label} has {} row(s); at least 2 are needed to appear in both splits",
            rows.len()
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for rows in classes.values_mut() {
        let n = rows.len();
        let n_test = ((n as f64 * test_ratio).round() as usize).clamp(1, n - 1);
        rows.shuffle(&mut rng);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    Ok(SplitIndices { train, test })
}
