//! Evaluate stage: score the persisted model on the held-out set.

use diagflow_dataset::{LABEL_COLUMN, Label, Table, require_column};
use diagflow_model::{
    Classifier, ConfusionMatrix, MetricsReport, TrainedModel, format_classification_report,
};
use diagflow_shared::{ArtifactKey, ArtifactLocation, Result};
use diagflow_storage::ArtifactStore;
use tracing::{info, instrument};

/// Output of [`evaluate`].
#[derive(Debug, Clone)]
pub struct EvaluateOutput {
    pub metrics: ArtifactLocation,
    pub report: MetricsReport,
    pub confusion: ConfusionMatrix,
}

/// Compute accuracy/precision/recall/F1 and write `metrics.json`.
///
/// Nothing is written unless every check passes.
#[instrument(skip_all, fields(model = %model_key, held_out = %held_out_key))]
pub fn evaluate(
    store: &dyn ArtifactStore,
    model_key: &ArtifactKey,
    held_out_key: &ArtifactKey,
) -> Result<EvaluateOutput> {
    store.require(model_key, "trained model")?;
    store.require(held_out_key, "held-out set")?;

    let model = TrainedModel::from_bytes(&store.get(model_key)?)?;
    let table = Table::from_csv(&store.get(held_out_key)?, true)?;

    require_column(&table, LABEL_COLUMN)?;
    for name in &model.feature_names {
        require_column(&table, name)?;
    }

    let truth: Vec<u8> = table.labels(LABEL_COLUMN)?.iter().map(Label::code).collect();
    let names: Vec<&str> = model.feature_names.iter().map(String::as_str).collect();
    let features = table.feature_matrix(&names)?;

    let classifier: &dyn Classifier = &model.classifier;
    let predicted = classifier.predict(&features)?;

    let confusion = ConfusionMatrix::from_predictions(&truth, &predicted)?;
    let report = confusion.report();
    info!(
        "classification report ({} rows)\n{}",
        truth.len(),
        format_classification_report(&confusion)
    );

    let location = store.put(&ArtifactKey::metrics(), &report.to_json_bytes()?)?;
    info!(
        accuracy = report.accuracy,
        precision = report.precision,
        recall = report.recall,
        f1 = report.f1,
        metrics = %location,
        "evaluation complete"
    );

    Ok(EvaluateOutput {
        metrics: location,
        report,
        confusion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagflow_model::{LogisticRegression, SolverConfig, TrainingMetadata};
    use diagflow_storage::MemoryArtifactStore;
    use ndarray::array;

    fn store_with_model() -> MemoryArtifactStore {
        let x = array![
            [-2.0, 0.0],
            [-1.0, 0.5],
            [-1.5, -0.5],
            [1.0, 0.2],
            [2.0, -0.2],
            [1.5, 0.0],
        ];
        let y = [0, 0, 0, 1, 1, 1];
        let mut clf = LogisticRegression::new(SolverConfig::default());
        let fit = clf.fit(&x, &y).unwrap();
        let meta = TrainingMetadata::new(42, 0.2, SolverConfig::default(), &fit, 6, 4);
        let model = TrainedModel::new(vec!["a".into(), "b".into()], clf, meta);

        let store = MemoryArtifactStore::new();
        store
            .put(&ArtifactKey::model(), &model.to_bytes().unwrap())
            .unwrap();
        store
    }

    #[test]
    fn writes_four_key_metrics() {
        let store = store_with_model();
        // Last row is a deliberate miss: benign label on the malignant side.
        store
            .put(
                &ArtifactKey::held_out(),
                b"a,b,diagnosis\n-1.2,0.1,B\n-0.8,0.0,B\n1.3,0.0,M\n1.1,0.3,B\n",
            )
            .unwrap();

        let out = evaluate(&store, &ArtifactKey::model(), &ArtifactKey::held_out()).unwrap();
        assert_eq!(out.report.accuracy, 0.75);
        assert_eq!(out.report.precision, 0.5);
        assert_eq!(out.report.recall, 1.0);

        let bytes = store.get(&ArtifactKey::metrics()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 4);
        assert_eq!(MetricsReport::from_json(&bytes).unwrap(), out.report);
    }

    #[test]
    fn missing_label_column_writes_nothing() {
        let store = store_with_model();
        store
            .put(&ArtifactKey::held_out(), b"a,b\n-1.2,0.1\n1.3,0.0\n")
            .unwrap();

        let err = evaluate(&store, &ArtifactKey::model(), &ArtifactKey::held_out()).unwrap_err();
        assert_eq!(err.kind(), "SchemaError");
        assert!(!store.exists(&ArtifactKey::metrics()));
    }

    #[test]
    fn missing_feature_column_is_schema_error() {
        let store = store_with_model();
        store
            .put(&ArtifactKey::held_out(), b"a,diagnosis\n-1.2,B\n1.3,M\n")
            .unwrap();

        let err = evaluate(&store, &ArtifactKey::model(), &ArtifactKey::held_out()).unwrap_err();
        assert_eq!(err.kind(), "SchemaError");
        assert!(!store.exists(&ArtifactKey::metrics()));
    }

    #[test]
    fn inputs_are_checked_before_any_work() {
        let store = MemoryArtifactStore::new();
        store
            .put(&ArtifactKey::held_out(), b"a,b,diagnosis\n1,2,B\n")
            .unwrap();
        let err = evaluate(&store, &ArtifactKey::model(), &ArtifactKey::held_out()).unwrap_err();
        assert_eq!(err.kind(), "NotFound");

        let store = store_with_model();
        let err = evaluate(&store, &ArtifactKey::model(), &ArtifactKey::held_out()).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
        assert!(!store.exists(&ArtifactKey::metrics()));
    }
}
