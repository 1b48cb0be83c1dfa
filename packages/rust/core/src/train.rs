//! Train stage: stratified split, fit, persist the model and held-out set.

use diagflow_dataset::{Column, LABEL_COLUMN, Label, Table, require_column};
use diagflow_model::{
    Classifier, LogisticRegression, MetricsReport, SolverConfig, TrainedModel, TrainingMetadata,
    stratified_split,
};
use diagflow_shared::{ArtifactKey, ArtifactLocation, Result, TrainingConfig};
use diagflow_storage::ArtifactStore;
use ndarray::Axis;
use tracing::{info, instrument, warn};

/// Non-fatal conditions raised while training.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingWarning {
    /// The solver hit its sweep cap before reaching the tolerance.
    Convergence { iterations: usize },
}

impl std::fmt::Display for TrainingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Convergence { iterations } => write!(
                f,
                "solver did not converge within {iterations} iterations; kept the best iterate"
            ),
        }
    }
}

/// Artifacts and diagnostics from [`train`].
#[derive(Debug, Clone)]
pub struct TrainOutput {
    pub model: ArtifactLocation,
    pub held_out: ArtifactLocation,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Held-out accuracy, logged as a sanity signal.
    pub sanity_accuracy: f64,
    pub warnings: Vec<TrainingWarning>,
}

/// Fit the classifier on the clean dataset at `clean_key`.
#[instrument(skip_all, fields(clean = %clean_key, seed = config.seed))]
pub fn train(
    store: &dyn ArtifactStore,
    clean_key: &ArtifactKey,
    config: &TrainingConfig,
) -> Result<TrainOutput> {
    config.validate()?;
    store.require(clean_key, "clean dataset")?;
    let table = Table::from_csv(&store.get(clean_key)?, true)?;
    require_column(&table, LABEL_COLUMN)?;

    let codes: Vec<u8> = table.labels(LABEL_COLUMN)?.iter().map(Label::code).collect();
    let feature_names: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|name| *name != LABEL_COLUMN)
        .map(str::to_string)
        .collect();
    let names: Vec<&str> = feature_names.iter().map(String::as_str).collect();
    let features = table.feature_matrix(&names)?;

    let split = stratified_split(&codes, config.test_fraction, config.seed)?;
    let x_train = features.select(Axis(0), &split.train);
    let x_test = features.select(Axis(0), &split.test);
    let y_train: Vec<u8> = split.train.iter().map(|&i| codes[i]).collect();
    let y_test: Vec<u8> = split.test.iter().map(|&i| codes[i]).collect();
    info!(train = x_train.nrows(), test = x_test.nrows(), "stratified split");

    let solver = SolverConfig {
        c: config.c,
        tol: config.tol,
        max_iter: config.max_iter,
        fit_intercept: true,
    };
    let mut classifier = LogisticRegression::new(solver.clone());
    let fit = classifier.fit(&x_train, &y_train)?;

    let mut warnings = Vec::new();
    if !fit.converged {
        let warning = TrainingWarning::Convergence {
            iterations: fit.iterations,
        };
        warn!(%warning, "convergence warning");
        warnings.push(warning);
    }

    let predicted = classifier.predict(&x_test)?;
    let sanity_accuracy = MetricsReport::compute(&y_test, &predicted)?.accuracy;
    info!(
        accuracy = sanity_accuracy,
        iterations = fit.iterations,
        "held-out sanity accuracy"
    );

    let metadata = TrainingMetadata::new(
        config.seed,
        config.test_fraction,
        solver,
        &fit,
        x_train.nrows(),
        x_test.nrows(),
    );
    let model = TrainedModel::new(feature_names, classifier, metadata);

    let mut held_out = table.select_rows(&split.test)?;
    let restored: Vec<Label> = y_test.iter().map(|&code| Label::from_code(code)).collect();
    held_out.replace_column(Column::labels(LABEL_COLUMN, &restored))?;

    let model_location = store.put(&ArtifactKey::model(), &model.to_bytes()?)?;
    let held_out_location = store.put(&ArtifactKey::held_out(), &held_out.to_csv()?)?;
    info!(model = %model_location, held_out = %held_out_location, "training complete");

    Ok(TrainOutput {
        model: model_location,
        held_out: held_out_location,
        train_rows: x_train.nrows(),
        test_rows: x_test.nrows(),
        sanity_accuracy,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagflow_storage::MemoryArtifactStore;

    /// Clean-style CSV: 3 scaled features, separable by sign of the first.
    fn clean_csv(benign: usize, malignant: usize) -> Vec<u8> {
        let mut out = String::from("f0,f1,f2,diagnosis\n");
        for i in 0..benign {
            out.push_str(&format!("{},{},0.1,B\n", -1.0 - i as f64 * 0.1, 0.05 * i as f64));
        }
        for i in 0..malignant {
            out.push_str(&format!("{},{},-0.1,M\n", 1.0 + i as f64 * 0.1, -0.05 * i as f64));
        }
        out.into_bytes()
    }

    fn seeded(benign: usize, malignant: usize) -> MemoryArtifactStore {
        let store = MemoryArtifactStore::new();
        store
            .put(&ArtifactKey::clean_dataset(), &clean_csv(benign, malignant))
            .unwrap();
        store
    }

    #[test]
    fn trains_and_persists_model_and_held_out_set() {
        let store = seeded(12, 8);
        let out = train(&store, &ArtifactKey::clean_dataset(), &TrainingConfig::default()).unwrap();
        assert_eq!(out.train_rows, 16);
        assert_eq!(out.test_rows, 4);
        assert_eq!(out.sanity_accuracy, 1.0);

        let model = TrainedModel::from_bytes(&store.get(&ArtifactKey::model()).unwrap()).unwrap();
        assert_eq!(model.feature_names, ["f0", "f1", "f2"]);
        assert_eq!(model.metadata.seed, 42);
        assert_eq!(model.metadata.train_rows, 16);

        let held_out =
            Table::from_csv(&store.get(&ArtifactKey::held_out()).unwrap(), true).unwrap();
        assert_eq!(held_out.n_rows(), 4);
        assert_eq!(held_out.column_names(), ["f0", "f1", "f2", "diagnosis"]);
        let labels = held_out.labels(LABEL_COLUMN).unwrap();
        assert_eq!(labels.iter().filter(|l| **l == Label::Malignant).count(), 2);
    }

    #[test]
    fn repeated_runs_write_identical_held_out_bytes() {
        let store = seeded(30, 20);
        train(&store, &ArtifactKey::clean_dataset(), &TrainingConfig::default()).unwrap();
        let first = store.get(&ArtifactKey::held_out()).unwrap();
        train(&store, &ArtifactKey::clean_dataset(), &TrainingConfig::default()).unwrap();
        let second = store.get(&ArtifactKey::held_out()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn iteration_cap_yields_convergence_warning() {
        let store = seeded(12, 8);
        let config = TrainingConfig {
            max_iter: 1,
            tol: 1e-12,
            ..TrainingConfig::default()
        };
        let out = train(&store, &ArtifactKey::clean_dataset(), &config).unwrap();
        assert_eq!(out.warnings, [TrainingWarning::Convergence { iterations: 1 }]);
        assert!(store.exists(&ArtifactKey::model()));

        let model = TrainedModel::from_bytes(&store.get(&ArtifactKey::model()).unwrap()).unwrap();
        assert!(!model.metadata.converged);
    }

    #[test]
    fn missing_inputs_are_reported() {
        let empty = MemoryArtifactStore::new();
        let err = train(&empty, &ArtifactKey::clean_dataset(), &TrainingConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");

        let no_label = MemoryArtifactStore::new();
        no_label
            .put(&ArtifactKey::clean_dataset(), b"f0,f1\n1,2\n3,4\n")
            .unwrap();
        let err = train(&no_label, &ArtifactKey::clean_dataset(), &TrainingConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), "SchemaError");
    }

    #[test]
    fn single_class_cannot_be_split() {
        let store = seeded(10, 0);
        let err = train(&store, &ArtifactKey::clean_dataset(), &TrainingConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), "DataQualityError");
        assert!(!store.exists(&ArtifactKey::model()));
    }
}
