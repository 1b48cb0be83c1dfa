//! Ingest stage: materialize the raw dataset artifact.

use std::path::Path;

use diagflow_dataset::{LABEL_COLUMN, RAW_COLUMN_COUNT, Table, raw_header};
use diagflow_shared::{ArtifactKey, ArtifactLocation, DiagflowError, Result};
use diagflow_storage::ArtifactStore;
use tracing::{info, instrument, warn};

use crate::sample;

/// Produce `data_raw.csv` from the synthetic sample or a headerless flat file.
///
/// An external file with exactly 32 columns gets the canonical raw header
/// (`id`, `diagnosis`, 30 features); any other width is passed through with
/// positional names.
#[instrument(skip_all, fields(source = ?source))]
pub fn ingest(store: &dyn ArtifactStore, source: Option<&Path>) -> Result<ArtifactLocation> {
    let table = match source {
        Some(path) => read_flat_file(path)?,
        None => {
            info!("no external source given, using synthetic sample");
            sample::synthetic_dataset()?
        }
    };

    if table.n_rows() == 0 {
        return Err(DiagflowError::data_quality("ingested dataset has zero rows"));
    }

    info!(rows = table.n_rows(), columns = table.n_cols(), "ingested dataset");
    if table.has_column(LABEL_COLUMN) {
        let distribution = table
            .value_counts(LABEL_COLUMN)
            .into_iter()
            .map(|(label, count)| format!("{label}={count}"))
            .collect::<Vec<_>>()
            .join(", ");
        info!(%distribution, "label distribution");
    }

    let location = store.put(&ArtifactKey::raw_dataset(), &table.to_csv()?)?;
    info!(%location, "raw dataset saved");
    Ok(location)
}

fn read_flat_file(path: &Path) -> Result<Table> {
    if !path.exists() {
        return Err(DiagflowError::not_found(
            "source dataset",
            path.display().to_string(),
        ));
    }
    let bytes = std::fs::read(path).map_err(|e| DiagflowError::io(path, e))?;
    let mut table = Table::from_csv(&bytes, false)?;

    if table.n_cols() == RAW_COLUMN_COUNT {
        let header = raw_header();
        table.rename_columns(|name| {
            name.parse::<usize>()
                .ok()
                .and_then(|i| header.get(i).cloned())
                .unwrap_or_else(|| name.to_string())
        })?;
    } else if table.n_cols() > 0 {
        warn!(
            columns = table.n_cols(),
            expected = RAW_COLUMN_COUNT,
            "unexpected column count, keeping positional column names"
        );
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagflow_storage::MemoryArtifactStore;

    fn temp_file(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("diagflow-ingest-{}.csv", uuid::Uuid::now_v7()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn raw_line(id: usize, label: &str) -> String {
        let features: Vec<String> = (0..30).map(|j| format!("{}.5", j + id)).collect();
        format!("{id},{label},{}", features.join(","))
    }

    #[test]
    fn synthetic_sample_is_written() {
        let store = MemoryArtifactStore::new();
        let location = ingest(&store, None).unwrap();
        assert_eq!(location.0, "memory://data_raw.csv");

        let table = Table::from_csv(&store.get(&ArtifactKey::raw_dataset()).unwrap(), true).unwrap();
        assert_eq!(table.n_rows(), 569);
        assert!(table.has_column(LABEL_COLUMN));
    }

    #[test]
    fn thirty_two_columns_get_canonical_names() {
        let path = temp_file(&format!("{}\n{}\n", raw_line(1, "M"), raw_line(2, "B")));
        let store = MemoryArtifactStore::new();
        ingest(&store, Some(&path)).unwrap();

        let table = Table::from_csv(&store.get(&ArtifactKey::raw_dataset()).unwrap(), true).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column_names()[..3], ["id", "diagnosis", "radius_mean"]);
        assert_eq!(table.column_names()[31], "fractal_dimension_worst");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn other_widths_keep_positional_names() {
        let path = temp_file("1,M,3.0\n2,B,4.0\n");
        let store = MemoryArtifactStore::new();
        ingest(&store, Some(&path)).unwrap();

        let table = Table::from_csv(&store.get(&ArtifactKey::raw_dataset()).unwrap(), true).unwrap();
        assert_eq!(table.column_names(), ["0", "1", "2"]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_source_is_not_found() {
        let store = MemoryArtifactStore::new();
        let path = std::env::temp_dir().join(format!("diagflow-missing-{}.csv", uuid::Uuid::now_v7()));
        let err = ingest(&store, Some(&path)).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
        assert!(!store.exists(&ArtifactKey::raw_dataset()));
    }

    #[test]
    fn empty_source_is_data_quality_error() {
        let path = temp_file("");
        let store = MemoryArtifactStore::new();
        let err = ingest(&store, Some(&path)).unwrap_err();
        assert_eq!(err.kind(), "DataQualityError");

        std::fs::remove_file(&path).ok();
    }
}
