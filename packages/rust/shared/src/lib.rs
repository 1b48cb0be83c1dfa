//! Shared types, error model, and configuration for diagflow.
//!
//! This crate is the foundation depended on by all other diagflow crates.
//! It provides:
//! - [`DiagflowError`]: the unified error type
//! - Domain types ([`ArtifactKey`], [`ArtifactLocation`], [`StageName`], [`RunId`])
//! - Configuration ([`AppConfig`], [`TrainingConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExportSection, OrchestratorSection, PathsConfig, PreprocessConfig,
    PreprocessSection, TrainingConfig, TrainingSection, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_endpoint,
};
pub use error::{DiagflowError, Result};
pub use types::{ArtifactKey, ArtifactLocation, RunId, StageName};
