//! Synthetic stand-in for the Wisconsin diagnostic dataset, used when no
//! external source is given.
//!
//! The reference rows are not shipped. Instead rows are drawn from per-class
//! normal profiles (mean, std per feature) of that dataset, giving the same
//! shape, class balance and separability but not the same values.
//!
//! The target is generated directly as `0` = benign, `1` = malignant and then
//! mapped `{0 → B, 1 → M}`. This differs from the reference loader's encoding
//! (`0` = malignant), so a real table fed through this mapping would need its
//! target inverted first.

use diagflow_dataset::{Column, FEATURE_NAMES, ID_COLUMN, LABEL_COLUMN, Label, Table};
use diagflow_shared::{DiagflowError, Result};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};

/// Benign rows in the sample.
pub const SAMPLE_BENIGN: usize = 357;

/// Malignant rows in the sample.
pub const SAMPLE_MALIGNANT: usize = 212;

const SAMPLE_SEED: u64 = 569;

/// Numeric target column before it is renamed to `diagnosis`.
const TARGET_COLUMN: &str = "target";

/// `[benign mean, benign std, malignant mean, malignant std]` per feature,
/// in `FEATURE_NAMES` order.
const PROFILES: [[f64; 4]; 30] = [
    [12.15, 1.78, 17.46, 3.20],
    [17.91, 4.00, 21.60, 3.78],
    [78.08, 11.8, 115.37, 21.85],
    [462.8, 134.3, 978.4, 367.9],
    [0.0925, 0.0134, 0.1029, 0.0126],
    [0.0801, 0.0337, 0.1452, 0.0540],
    [0.0461, 0.0434, 0.1608, 0.0750],
    [0.0257, 0.0159, 0.0880, 0.0344],
    [0.174, 0.0248, 0.1929, 0.0276],
    [0.0629, 0.0067, 0.0627, 0.0076],
    [0.284, 0.113, 0.609, 0.345],
    [1.220, 0.589, 1.211, 0.483],
    [2.000, 0.771, 4.324, 2.569],
    [21.14, 8.84, 72.67, 61.36],
    [0.00720, 0.00306, 0.00678, 0.00289],
    [0.0214, 0.0164, 0.0323, 0.0183],
    [0.0260, 0.0329, 0.0418, 0.0216],
    [0.00986, 0.00571, 0.0151, 0.00553],
    [0.0206, 0.00700, 0.0205, 0.0101],
    [0.00364, 0.00294, 0.00406, 0.00204],
    [13.38, 1.98, 21.13, 4.28],
    [23.52, 5.49, 29.32, 5.43],
    [87.01, 13.53, 141.37, 29.46],
    [558.9, 163.6, 1422.3, 597.97],
    [0.1250, 0.0201, 0.1448, 0.0219],
    [0.1827, 0.0922, 0.3748, 0.1706],
    [0.1662, 0.1404, 0.4506, 0.1815],
    [0.0744, 0.0358, 0.1822, 0.0464],
    [0.2702, 0.0418, 0.3235, 0.0746],
    [0.0794, 0.0138, 0.0915, 0.0216],
];

/// Generate the synthetic sample: `id`, 30 features and `diagnosis` (`B`/`M`).
///
/// Output is identical on every call.
pub fn synthetic_dataset() -> Result<Table> {
    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);

    let mut target: Vec<u8> = std::iter::repeat_n(0, SAMPLE_BENIGN)
        .chain(std::iter::repeat_n(1, SAMPLE_MALIGNANT))
        .collect();
    target.shuffle(&mut rng);

    let mut distributions = Vec::with_capacity(PROFILES.len());
    for (name, [b_mean, b_std, m_mean, m_std]) in FEATURE_NAMES.iter().zip(PROFILES) {
        let benign = Normal::new(b_mean, b_std)
            .map_err(|e| DiagflowError::config(format!("bad profile for {name}: {e}")))?;
        let malignant = Normal::new(m_mean, m_std)
            .map_err(|e| DiagflowError::config(format!("bad profile for {name}: {e}")))?;
        distributions.push(((benign, b_mean), (malignant, m_mean)));
    }

    let mut features = Array2::<f64>::zeros((target.len(), FEATURE_NAMES.len()));
    for (mut row, &class) in features.rows_mut().into_iter().zip(&target) {
        for (cell, ((benign, b_mean), (malignant, m_mean))) in row.iter_mut().zip(&distributions) {
            let (dist, mean) = if class == 0 {
                (benign, *b_mean)
            } else {
                (malignant, *m_mean)
            };
            // Measurements are strictly positive.
            *cell = round6(dist.sample(&mut rng).max(0.01 * mean));
        }
    }

    let mut columns = Vec::with_capacity(FEATURE_NAMES.len() + 2);
    columns.push(Column::dense(
        ID_COLUMN,
        (1..=target.len()).map(|i| i as f64).collect(),
    ));
    for (name, values) in FEATURE_NAMES.iter().zip(features.columns()) {
        columns.push(Column::dense(*name, values.to_vec()));
    }
    columns.push(Column::dense(
        TARGET_COLUMN,
        target.iter().map(|&t| f64::from(t)).collect(),
    ));
    let mut table = Table::new(columns)?;

    // Numeric target becomes the categorical diagnosis column.
    let labels: Vec<Label> = target.iter().map(|&t| Label::from_code(t)).collect();
    table.drop_column(TARGET_COLUMN);
    table.push_column(Column::labels(LABEL_COLUMN, &labels))?;
    Ok(table)
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_has_reference_shape_and_balance() {
        let table = synthetic_dataset().unwrap();
        assert_eq!(table.n_rows(), SAMPLE_BENIGN + SAMPLE_MALIGNANT);
        assert_eq!(table.n_cols(), 32);
        assert_eq!(table.column_names()[0], ID_COLUMN);
        assert_eq!(*table.column_names().last().unwrap(), LABEL_COLUMN);

        let counts = table.value_counts(LABEL_COLUMN);
        assert_eq!(
            counts,
            vec![("B".to_string(), SAMPLE_BENIGN), ("M".to_string(), SAMPLE_MALIGNANT)]
        );
    }

    #[test]
    fn sample_is_deterministic_and_positive() {
        let a = synthetic_dataset().unwrap();
        let b = synthetic_dataset().unwrap();
        assert_eq!(a.to_csv().unwrap(), b.to_csv().unwrap());

        let x = a.feature_matrix(&FEATURE_NAMES).unwrap();
        assert!(x.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn malignant_rows_are_larger_on_average() {
        let table = synthetic_dataset().unwrap();
        let labels = table.labels(LABEL_COLUMN).unwrap();
        let radius = table.feature_matrix(&["radius_mean"]).unwrap();

        let mean_of = |label: Label| {
            let xs: Vec<f64> = radius
                .column(0)
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == label)
                .map(|(r, _)| *r)
                .collect();
            xs.iter().sum::<f64>() / xs.len() as f64
        };
        assert!(mean_of(Label::Malignant) > mean_of(Label::Benign) + 3.0);
    }
}
