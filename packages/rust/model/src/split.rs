//! Deterministic stratified train/test split.

use std::collections::BTreeMap;

use diagflow_shared::{DiagflowError, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Row indices of the two partitions, each in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StratifiedSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Number of rows held out: `ceil(test_fraction * n)`.
pub fn test_size(n: usize, test_fraction: f64) -> usize {
    // Guard against 0.2 * 20 landing a hair above 4.
    ((test_fraction * n as f64) - 1e-9).ceil().max(0.0) as usize
}

/// Split `labels` into stratified train/test partitions.
///
/// Per-class test counts follow the class proportions with largest-remainder
/// rounding (ties go to the lower class code). Inside each class, rows are
/// shuffled by a `StdRng` seeded with `seed` and the first `k` are held out,
/// so the same labels, fraction and seed always give the same partitions.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> Result<StratifiedSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(DiagflowError::config(format!(
            "test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let n = labels.len();
    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    if by_class.len() < 2 {
        return Err(DiagflowError::data_quality(
            "stratified split needs at least two classes",
        ));
    }
    if let Some((class, rows)) = by_class.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(DiagflowError::data_quality(format!(
            "class {class} has {} row(s); stratified split needs at least 2 per class",
            rows.len()
        )));
    }

    let n_test = test_size(n, test_fraction);
    let n_train = n - n_test;
    if n_test < by_class.len() || n_train < by_class.len() {
        return Err(DiagflowError::data_quality(format!(
            "{n} rows cannot be split into {n_train} train / {n_test} test rows covering {} classes",
            by_class.len()
        )));
    }

    let allocation = allocate(&by_class, n, n_test);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for ((_, rows), k) in by_class.iter().zip(allocation) {
        let mut shuffled = rows.clone();
        shuffled.shuffle(&mut rng);
        test.extend_from_slice(&shuffled[..k]);
        train.extend_from_slice(&shuffled[k..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    Ok(StratifiedSplit { train, test })
}

/// Largest-remainder allocation of `n_test` rows across classes.
fn allocate(by_class: &BTreeMap<u8, Vec<usize>>, n: usize, n_test: usize) -> Vec<usize> {
    let capacity: Vec<usize> = by_class.values().map(Vec::len).collect();
    let exact: Vec<f64> = capacity
        .iter()
        .map(|&len| len as f64 * n_test as f64 / n as f64)
        .collect();
    let mut counts: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();

    let mut order: Vec<usize> = (0..exact.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let mut remaining = n_test - counts.iter().sum::<usize>();
    for &i in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        if counts[i] < capacity[i] {
            counts[i] += 1;
            remaining -= 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(benign: usize, malignant: usize) -> Vec<u8> {
        // Interleave so classes are not in contiguous blocks.
        let mut out = Vec::new();
        let (mut b, mut m) = (benign, malignant);
        while b > 0 || m > 0 {
            if b > 0 {
                out.push(0);
                b -= 1;
            }
            if m > 0 && b % 2 == 0 {
                out.push(1);
                m -= 1;
            }
        }
        out
    }

    #[test]
    fn twenty_rows_split_sixteen_four() {
        let y = labels(12, 8);
        assert_eq!(y.len(), 20);
        let split = stratified_split(&y, 0.2, 42).unwrap();
        assert_eq!(split.train.len(), 16);
        assert_eq!(split.test.len(), 4);

        let test_pos = split.test.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(test_pos, 2);
    }

    #[test]
    fn partitions_are_disjoint_and_cover_everything() {
        let y = labels(357, 212);
        let split = stratified_split(&y, 0.2, 42).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..y.len()).collect::<Vec<_>>());
        assert_eq!(split.test.len(), 114);
        assert_eq!(split.train.len(), 455);
    }

    #[test]
    fn class_proportions_are_preserved() {
        let y = labels(357, 212);
        let split = stratified_split(&y, 0.2, 42).unwrap();
        let full = 212.0 / 569.0;
        for part in [&split.train, &split.test] {
            let pos = part.iter().filter(|&&i| y[i] == 1).count() as f64;
            let share = pos / part.len() as f64;
            assert!((share - full).abs() < 0.01, "share {share} vs {full}");
        }
    }

    #[test]
    fn same_seed_same_split() {
        let y = labels(60, 40);
        let a = stratified_split(&y, 0.2, 42).unwrap();
        let b = stratified_split(&y, 0.2, 42).unwrap();
        assert_eq!(a, b);

        let c = stratified_split(&y, 0.2, 7).unwrap();
        assert_eq!(c.test.len(), a.test.len());
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        assert_eq!(
            stratified_split(&[0, 0, 0, 0], 0.2, 42).unwrap_err().kind(),
            "DataQualityError"
        );
        assert_eq!(
            stratified_split(&[0, 0, 0, 1], 0.2, 42).unwrap_err().kind(),
            "DataQualityError"
        );
        assert_eq!(
            stratified_split(&[0, 1, 0, 1], 1.5, 42).unwrap_err().kind(),
            "ConfigError"
        );
    }

    #[test]
    fn test_size_rounds_up() {
        assert_eq!(test_size(20, 0.2), 4);
        assert_eq!(test_size(569, 0.2), 114);
        assert_eq!(test_size(7, 0.2), 2);
    }
}
