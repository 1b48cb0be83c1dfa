//! Application configuration for diagflow.
//!
//! User config lives at `~/.diagflow/diagflow.toml`.
//! CLI flags (and their environment variables) override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DiagflowError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "diagflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".diagflow";

// ---------------------------------------------------------------------------
// Config structs (matching diagflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Artifact locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Preprocessing options.
    #[serde(default)]
    pub preprocess: PreprocessSection,

    /// Split and solver settings.
    #[serde(default)]
    pub training: TrainingSection,

    /// Delivery settings.
    #[serde(default)]
    pub export: ExportSection,

    /// Retry policy for the stage runner.
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the artifact store.
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// Optional external raw flat file; the synthetic sample is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_csv: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            source_csv: None,
        }
    }
}

fn default_results_dir() -> String {
    "results".into()
}

/// `[preprocess]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessSection {
    /// Fail instead of warning when the feature count is not 30.
    #[serde(default)]
    pub strict_feature_count: bool,
}

/// `[training]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSection {
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    /// Inverse regularisation strength.
    #[serde(default = "default_c")]
    pub c: f64,

    #[serde(default = "default_tol")]
    pub tol: f64,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            test_fraction: default_test_fraction(),
            max_iter: default_max_iter(),
            c: default_c(),
            tol: default_tol(),
        }
    }
}

fn default_seed() -> u64 {
    42
}
fn default_test_fraction() -> f64 {
    0.2
}
fn default_max_iter() -> usize {
    1000
}
fn default_c() -> f64 {
    1.0
}
fn default_tol() -> f64 {
    1e-4
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSection {
    /// `local` or `remote`.
    #[serde(default = "default_export_mode")]
    pub mode: String,

    /// Destination directory for `local` mode.
    #[serde(default = "default_export_dir")]
    pub out_dir: String,

    /// Destination bucket for `remote` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Key prefix prepended to each uploaded file name.
    #[serde(default)]
    pub prefix: String,

    /// Object storage endpoint for `remote` mode.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the storage token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            mode: default_export_mode(),
            out_dir: default_export_dir(),
            bucket: None,
            prefix: String::new(),
            endpoint: default_endpoint(),
            token_env: default_token_env(),
        }
    }
}

fn default_export_mode() -> String {
    "local".into()
}
fn default_export_dir() -> String {
    "results/export".into()
}
fn default_endpoint() -> String {
    "http://localhost:9000".into()
}
fn default_token_env() -> String {
    "DIAGFLOW_STORAGE_TOKEN".into()
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    /// Retries per stage after the first attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Fixed delay between attempts, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

fn default_retries() -> u32 {
    1
}
fn default_retry_delay() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime preprocessing configuration.
#[derive(Debug, Clone, Default)]
pub struct PreprocessConfig {
    /// Promote the feature-count warning to a schema error.
    pub strict_feature_count: bool,
}

impl From<&AppConfig> for PreprocessConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            strict_feature_count: config.preprocess.strict_feature_count,
        }
    }
}

/// Runtime training configuration.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Seed for the stratified split.
    pub seed: u64,
    /// Fraction of rows held out for evaluation.
    pub test_fraction: f64,
    /// Maximum coordinate-descent sweeps.
    pub max_iter: usize,
    /// Inverse regularisation strength.
    pub c: f64,
    /// Convergence tolerance on the largest coordinate gradient.
    pub tol: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for TrainingConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            seed: config.training.seed,
            test_fraction: config.training.test_fraction,
            max_iter: config.training.max_iter,
            c: config.training.c,
            tol: config.training.tol,
        }
    }
}

impl TrainingConfig {
    /// Reject values the split and solver cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(DiagflowError::config(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.max_iter == 0 {
            return Err(DiagflowError::config("max_iter must be at least 1"));
        }
        if !(self.c > 0.0) || !self.c.is_finite() {
            return Err(DiagflowError::config(format!("c must be positive, got {}", self.c)));
        }
        if !(self.tol > 0.0) {
            return Err(DiagflowError::config(format!("tol must be positive, got {}", self.tol)));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.diagflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DiagflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.diagflow/diagflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DiagflowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DiagflowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DiagflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DiagflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DiagflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that a remote endpoint is a usable http(s) URL.
pub fn validate_endpoint(endpoint: &str) -> Result<url::Url> {
    let url = url::Url::parse(endpoint)
        .map_err(|e| DiagflowError::config(format!("invalid endpoint '{endpoint}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DiagflowError::config(format!(
            "endpoint scheme must be http or https, got '{other}'"
        ))),
    }
}
