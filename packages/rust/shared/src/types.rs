//! Core domain types shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ArtifactKey / ArtifactLocation
// ---------------------------------------------------------------------------

/// Key of an artifact inside an artifact store (e.g. `data_raw.csv`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Raw dataset written by the ingestor.
    pub const RAW_DATASET: &'static str = "data_raw.csv";
    /// Cleaned, scaled dataset written by the preprocessor.
    pub const CLEAN_DATASET: &'static str = "data_clean.csv";
    /// Fitted scaler written by the preprocessor.
    pub const SCALER: &'static str = "scaler.bin";
    /// Trained classifier written by the trainer.
    pub const MODEL: &'static str = "model.bin";
    /// Held-out evaluation set written by the trainer.
    pub const HELD_OUT: &'static str = "test_data.csv";
    /// Metrics report written by the evaluator.
    pub const METRICS: &'static str = "metrics.json";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn raw_dataset() -> Self {
        Self::new(Self::RAW_DATASET)
    }

    pub fn clean_dataset() -> Self {
        Self::new(Self::CLEAN_DATASET)
    }

    pub fn scaler() -> Self {
        Self::new(Self::SCALER)
    }

    pub fn model() -> Self {
        Self::new(Self::MODEL)
    }

    pub fn held_out() -> Self {
        Self::new(Self::HELD_OUT)
    }

    pub fn metrics() -> Self {
        Self::new(Self::METRICS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the key, used as the delivered file name.
    pub fn file_name(&self) -> &str {
        self.0
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.0.as_str())
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Resolved, human-readable location of an artifact (absolute path or URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactLocation(pub String);

impl std::fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// StageName
// ---------------------------------------------------------------------------

/// The five pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Ingest,
    Preprocess,
    Train,
    Evaluate,
    Export,
}

impl StageName {
    /// All stages in dependency order.
    pub const ALL: [StageName; 5] = [
        StageName::Ingest,
        StageName::Preprocess,
        StageName::Train,
        StageName::Evaluate,
        StageName::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Preprocess => "preprocess",
            Self::Train => "train",
            Self::Evaluate => "evaluate",
            Self::Export => "export",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn artifact_key_file_name() {
        assert_eq!(ArtifactKey::model().file_name(), "model.bin");
        assert_eq!(ArtifactKey::new("runs/42/metrics.json").file_name(), "metrics.json");
        assert_eq!(ArtifactKey::new("/abs/dir/model.bin").file_name(), "model.bin");
    }

    #[test]
    fn stages_are_ordered() {
        let names: Vec<&str> = StageName::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, ["ingest", "preprocess", "train", "evaluate", "export"]);
    }
}
