//! Preprocess stage: validate, normalize and scale the raw dataset.

use diagflow_dataset::{
    Column, FEATURE_COUNT, ID_COLUMN, LABEL_COLUMN, Table, normalize_header, require_column,
};
use diagflow_model::ScalerModel;
use diagflow_shared::{ArtifactKey, ArtifactLocation, DiagflowError, PreprocessConfig, Result};
use diagflow_storage::ArtifactStore;
use tracing::{info, instrument, warn};

/// Artifacts written by [`preprocess`].
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    pub clean: ArtifactLocation,
    pub scaler: ArtifactLocation,
    pub rows: usize,
    pub features: usize,
}

/// Turn the raw dataset at `raw_key` into `data_clean.csv` and `scaler.bin`.
#[instrument(skip_all, fields(raw = %raw_key))]
pub fn preprocess(
    store: &dyn ArtifactStore,
    raw_key: &ArtifactKey,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    store.require(raw_key, "raw dataset")?;
    let mut table = Table::from_csv(&store.get(raw_key)?, true)?;
    info!(rows = table.n_rows(), columns = table.n_cols(), "loaded raw dataset");

    if table.drop_column(ID_COLUMN).is_some() {
        info!("dropped identifier column");
    }
    table.rename_columns(normalize_header)?;
    require_column(&table, LABEL_COLUMN)?;

    let feature_names: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|name| *name != LABEL_COLUMN)
        .map(str::to_string)
        .collect();
    check_feature_count(feature_names.len(), config)?;

    let names: Vec<&str> = feature_names.iter().map(String::as_str).collect();
    let missing = table.missing_count(&names);
    if missing > 0 {
        return Err(DiagflowError::data_quality(format!(
            "found {missing} missing values in feature columns"
        )));
    }
    let non_finite = table.non_finite_count(&names);
    if non_finite > 0 {
        return Err(DiagflowError::data_quality(format!(
            "found {non_finite} non-finite values in feature columns"
        )));
    }
    let features = table.feature_matrix(&names)?;
    let labels = table.labels(LABEL_COLUMN)?;
    if features.nrows() == 0 {
        return Err(DiagflowError::data_quality("raw dataset has zero rows"));
    }

    let scaler = ScalerModel::fit(feature_names.clone(), features.view())?;
    let scaled = scaler.transform(features.view())?;
    for (name, values) in feature_names.iter().zip(scaled.columns()) {
        table.replace_column(Column::dense(name.as_str(), values.to_vec()))?;
    }
    table.replace_column(Column::labels(LABEL_COLUMN, &labels))?;

    let scaler_location = store.put(&ArtifactKey::scaler(), &scaler.to_bytes()?)?;
    let clean_location = store.put(&ArtifactKey::clean_dataset(), &table.to_csv()?)?;

    info!(
        rows = table.n_rows(),
        features = feature_names.len(),
        clean = %clean_location,
        scaler = %scaler_location,
        "preprocessing complete"
    );

    Ok(PreprocessOutput {
        clean: clean_location,
        scaler: scaler_location,
        rows: table.n_rows(),
        features: feature_names.len(),
    })
}

fn check_feature_count(found: usize, config: &PreprocessConfig) -> Result<()> {
    if found == FEATURE_COUNT {
        return Ok(());
    }
    if config.strict_feature_count {
        return Err(DiagflowError::schema(format!(
            "expected {FEATURE_COUNT} feature columns, found {found}"
        )));
    }
    warn!(found, expected = FEATURE_COUNT, "unexpected number of feature columns");
    Ok(())
}
