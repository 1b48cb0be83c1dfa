//! Export stage: deliver the model and metrics to their destination.

use std::path::PathBuf;

use diagflow_shared::{AppConfig, ArtifactKey, ArtifactLocation, DiagflowError, Result};
use diagflow_storage::{ArtifactStore, sha256_hex, write_atomic};
use serde::Serialize;
use tracing::{info, instrument};

use crate::remote::ObjectUploader;

/// Where exported artifacts go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Local,
    Remote,
}

impl ExportMode {
    /// Parse `local` or `remote`; anything else is `UnsupportedMode`.
    pub fn parse(mode: &str) -> Result<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(DiagflowError::UnsupportedMode(mode.to_string())),
        }
    }
}

/// Runtime export settings.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// `local` or `remote`; parsed when the stage runs.
    pub mode: String,
    /// Destination directory for `local`.
    pub out_dir: PathBuf,
    /// Destination bucket for `remote`.
    pub bucket: Option<String>,
    /// Prepended verbatim to each file name to form the object key.
    pub prefix: String,
}

impl From<&AppConfig> for ExportConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            mode: config.export.mode.clone(),
            out_dir: PathBuf::from(&config.export.out_dir),
            bucket: config.export.bucket.clone(),
            prefix: config.export.prefix.clone(),
        }
    }
}

/// One delivered copy of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveredArtifact {
    pub location: ArtifactLocation,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Artifacts the exporter delivers, in order.
fn export_keys() -> [ArtifactKey; 2] {
    [ArtifactKey::model(), ArtifactKey::metrics()]
}

/// Copy (`local`) or upload (`remote`) `model.bin` and `metrics.json`.
///
/// Sources are read, never written. Both must exist before anything is
/// delivered.
#[instrument(skip_all, fields(mode = %config.mode))]
pub async fn export<U: ObjectUploader>(
    store: &dyn ArtifactStore,
    config: &ExportConfig,
    uploader: &U,
) -> Result<Vec<DeliveredArtifact>> {
    let mode = ExportMode::parse(&config.mode)?;
    let bucket = match mode {
        ExportMode::Remote => Some(
            config
                .bucket
                .as_deref()
                .filter(|b| !b.trim().is_empty())
                .ok_or_else(|| DiagflowError::config("remote export requires a bucket"))?,
        ),
        ExportMode::Local => None,
    };

    for key in export_keys() {
        store.require(&key, &format!("export source '{key}'"))?;
    }

    let mut delivered = Vec::with_capacity(2);
    for key in export_keys() {
        let bytes = store.get(&key)?;
        let size_bytes = bytes.len() as u64;
        let sha256 = sha256_hex(&bytes);

        let location = match bucket {
            Some(bucket) => {
                let object_key = format!("{}{}", config.prefix, key.file_name());
                uploader.put_object(bucket, &object_key, bytes).await?
            }
            None => {
                let target = config.out_dir.join(key.file_name());
                write_atomic(&target, &bytes)?;
                let target = std::path::absolute(&target).unwrap_or(target);
                ArtifactLocation(target.display().to_string())
            }
        };

        info!(%location, size_bytes, %sha256, "exported artifact");
        delivered.push(DeliveredArtifact {
            location,
            size_bytes,
            sha256,
        });
    }

    Ok(delivered)
}
