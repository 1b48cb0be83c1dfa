//! Canonical diagnostic schema: column names, labels, header rules.

use diagflow_shared::{DiagflowError, Result};
use serde::{Deserialize, Serialize};

use crate::table::Table;

/// Identifier column present in the raw UCI layout.
pub const ID_COLUMN: &str = "id";

/// Categorical label column holding `B` or `M`.
pub const LABEL_COLUMN: &str = "diagnosis";

/// Expected number of numeric feature columns.
pub const FEATURE_COUNT: usize = 30;

/// Column count of the raw headerless flat file: id, diagnosis, 30 features.
pub const RAW_COLUMN_COUNT: usize = 32;

/// The 30 canonical feature names, in raw-file order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "radius_mean",
    "texture_mean",
    "perimeter_mean",
    "area_mean",
    "smoothness_mean",
    "compactness_mean",
    "concavity_mean",
    "concave_points_mean",
    "symmetry_mean",
    "fractal_dimension_mean",
    "radius_se",
    "texture_se",
    "perimeter_se",
    "area_se",
    "smoothness_se",
    "compactness_se",
    "concavity_se",
    "concave_points_se",
    "symmetry_se",
    "fractal_dimension_se",
    "radius_worst",
    "texture_worst",
    "perimeter_worst",
    "area_worst",
    "smoothness_worst",
    "compactness_worst",
    "concavity_worst",
    "concave_points_worst",
    "symmetry_worst",
    "fractal_dimension_worst",
];

/// Header names of the 32-column raw layout.
pub fn raw_header() -> Vec<String> {
    let mut names = Vec::with_capacity(RAW_COLUMN_COUNT);
    names.push(ID_COLUMN.to_string());
    names.push(LABEL_COLUMN.to_string());
    names.extend(FEATURE_NAMES.iter().map(|s| (*s).to_string()));
    names
}

/// Normalize a header to snake_case: trim, spaces → `_`, lower-case.
pub fn normalize_header(name: &str) -> String {
    name.trim().replace(' ', "_").to_lowercase()
}

/// Fail with `SchemaError` unless `table` has a column called `name`.
pub fn require_column(table: &Table, name: &str) -> Result<()> {
    if table.has_column(name) {
        Ok(())
    } else {
        Err(DiagflowError::schema(format!(
            "expected column '{name}' is missing (found: {})",
            table.column_names().join(", ")
        )))
    }
}

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// Diagnosis label. Malignant is the positive class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Benign,
    Malignant,
}

impl Label {
    /// Both labels in encoding order.
    pub const ALL: [Label; 2] = [Label::Benign, Label::Malignant];

    /// Parse the categorical value (`B` or `M`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "B" => Some(Self::Benign),
            "M" => Some(Self::Malignant),
            _ => None,
        }
    }

    /// Categorical value written to datasets.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Benign => "B",
            Self::Malignant => "M",
        }
    }

    /// Binary encoding: `B → 0`, `M → 1`.
    pub fn code(&self) -> u8 {
        match self {
            Self::Benign => 0,
            Self::Malignant => 1,
        }
    }

    /// Inverse of [`Label::code`]; any non-zero code is malignant.
    pub fn from_code(code: u8) -> Self {
        if code == 0 { Self::Benign } else { Self::Malignant }
    }

    /// Long name used in reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Benign => "Benign",
            Self::Malignant => "Malignant",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
