//! Per-feature z-score scaler.

use diagflow_shared::{DiagflowError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::codec;

/// Fitted z-score transform: `(x - mean) / std` per feature.
///
/// Standard deviations are population (ddof = 0); a near-constant column is
/// scaled by 1 so it maps to zeros instead of dividing by ~0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerModel {
    pub schema_version: u32,
    /// Feature names in column order; future inputs must match.
    pub feature_names: Vec<String>,
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
    /// Rows seen during fitting.
    pub n_samples: usize,
}

impl ScalerModel {
    /// Fit column means and standard deviations.
    pub fn fit(feature_names: Vec<String>, x: ArrayView2<'_, f64>) -> Result<Self> {
        check_width(x.ncols(), feature_names.len())?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(DiagflowError::data_quality(
                "cannot fit a scaler on non-finite values",
            ));
        }
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| DiagflowError::data_quality("cannot fit a scaler on zero rows"))?;
        let std = x
            .std_axis(Axis(0), 0.0)
            .mapv_into(|s| if s < 10.0 * f64::EPSILON { 1.0 } else { s });

        Ok(Self {
            schema_version: codec::ARTIFACT_SCHEMA_VERSION,
            feature_names,
            mean,
            std,
            n_samples: x.nrows(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Scale every row.
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_width(x.ncols(), self.n_features())?;
        Ok((&x - &self.mean) / &self.std)
    }

    /// Undo the scaling.
    pub fn inverse_transform(&self, z: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_width(z.ncols(), self.n_features())?;
        Ok(&z * &self.std + &self.mean)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec::encode("scaler", self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let scaler: Self = codec::decode("scaler", bytes)?;
        codec::check_version("scaler", scaler.schema_version)?;
        if scaler.mean.len() != scaler.n_features() || scaler.std.len() != scaler.n_features() {
            return Err(DiagflowError::schema(format!(
                "scaler has {} feature names but {} means and {} stds",
                scaler.n_features(),
                scaler.mean.len(),
                scaler.std.len()
            )));
        }
        Ok(scaler)
    }
}

fn check_width(found: usize, expected: usize) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(DiagflowError::schema(format!(
            "scaler expects {expected} features, got {found}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn scaled_columns_are_standardized() {
        let x = array![
            [1.0, 100.0, 5.0],
            [2.0, 300.0, 5.0],
            [3.0, 200.0, 5.0],
            [6.0, 400.0, 5.0],
        ];
        let scaler = ScalerModel::fit(names(3), x.view()).unwrap();
        let scaled = scaler.transform(x.view()).unwrap();

        let mean = scaled.mean_axis(Axis(0)).unwrap();
        let std = scaled.std_axis(Axis(0), 0.0);
        for j in 0..2 {
            assert!(mean[j].abs() < 1e-12, "mean {}", mean[j]);
            assert!((std[j] - 1.0).abs() < 1e-12, "std {}", std[j]);
        }

        // Constant column: std falls back to 1, values become 0.
        assert_eq!(scaler.std[2], 1.0);
        assert!(scaled.column(2).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn inverse_restores_input() {
        let x = array![[1.0, -2.0], [3.0, 4.0], [5.0, 0.5]];
        let scaler = ScalerModel::fit(names(2), x.view()).unwrap();
        let scaled = scaler.transform(x.view()).unwrap();
        let back = scaler.inverse_transform(scaled.view()).unwrap();
        for (a, b) in back.iter().zip(x.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn wrong_width_is_schema_error() {
        let scaler = ScalerModel::fit(names(2), array![[1.0, 2.0], [3.0, 5.0]].view()).unwrap();
        assert_eq!(
            scaler.transform(array![[1.0]].view()).unwrap_err().kind(),
            "SchemaError"
        );
        assert_eq!(
            ScalerModel::fit(names(2), array![[1.0]].view()).unwrap_err().kind(),
            "SchemaError"
        );
    }

    #[test]
    fn persisted_scaler_is_reusable() {
        let x = array![[1.0, 10.0], [2.0, 30.0]];
        let scaler = ScalerModel::fit(names(2), x.view()).unwrap();
        let restored = ScalerModel::from_bytes(&scaler.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, scaler);

        let unseen = array![[1.5, 20.0]];
        assert_eq!(
            restored.transform(unseen.view()).unwrap(),
            scaler.transform(unseen.view()).unwrap()
        );
    }

    #[test]
    fn empty_or_infinite_input_is_rejected() {
        let empty = Array2::<f64>::zeros((0, 2));
        let err = ScalerModel::fit(names(2), empty.view()).unwrap_err();
        assert_eq!(err.kind(), "DataQualityError");

        let err = ScalerModel::fit(names(2), array![[1.0, f64::INFINITY], [2.0, 3.0]].view())
            .unwrap_err();
        assert_eq!(err.kind(), "DataQualityError");
    }
}
