//! Tabular data model and diagnostic schema for diagflow.
//!
//! - [`Table`]: named, typed columns validated at every stage boundary
//! - [`schema`]: canonical column names, [`Label`] encoding, header rules

pub mod schema;
pub mod table;

pub use schema::{
    FEATURE_COUNT, FEATURE_NAMES, ID_COLUMN, LABEL_COLUMN, Label, RAW_COLUMN_COUNT,
    normalize_header, raw_header, require_column,
};
pub use table::{Column, ColumnData, Table};
