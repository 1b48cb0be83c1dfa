//! The persisted model artifact: fitted classifier plus training provenance.

use chrono::{DateTime, Utc};
use diagflow_shared::{DiagflowError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::classifier::{Classifier, FitReport, LogisticRegression, SolverConfig};
use crate::codec;

/// Settings and outcome of the training run that produced a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub seed: u64,
    pub test_fraction: f64,
    pub solver: SolverConfig,
    pub iterations: usize,
    pub converged: bool,
    pub objective: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub trained_at: DateTime<Utc>,
}

impl TrainingMetadata {
    pub fn new(
        seed: u64,
        test_fraction: f64,
        solver: SolverConfig,
        fit: &FitReport,
        train_rows: usize,
        test_rows: usize,
    ) -> Self {
        Self {
            seed,
            test_fraction,
            solver,
            iterations: fit.iterations,
            converged: fit.converged,
            objective: fit.objective,
            train_rows,
            test_rows,
            trained_at: Utc::now(),
        }
    }
}

/// A fitted classifier ready for prediction on scaled features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub schema_version: u32,
    /// Feature columns the classifier was fitted on, in order.
    pub feature_names: Vec<String>,
    pub classifier: LogisticRegression,
    pub metadata: TrainingMetadata,
}

impl TrainedModel {
    pub fn new(
        feature_names: Vec<String>,
        classifier: LogisticRegression,
        metadata: TrainingMetadata,
    ) -> Self {
        Self {
            schema_version: codec::ARTIFACT_SCHEMA_VERSION,
            feature_names,
            classifier,
            metadata,
        }
    }

    /// Predict binary codes for rows whose columns follow `feature_names`.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<u8>> {
        self.classifier.predict(features)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec::encode("model", self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: Self = codec::decode("model", bytes)?;
        codec::check_version("model", model.schema_version)?;
        if !model.classifier.is_fitted() {
            return Err(DiagflowError::schema("model artifact holds an unfitted classifier"));
        }
        if model.classifier.coefficients().len() != model.feature_names.len() {
            return Err(DiagflowError::schema(format!(
                "model artifact has {} coefficients for {} features",
                model.classifier.coefficients().len(),
                model.feature_names.len()
            )));
        }
        Ok(model)
    }
}
