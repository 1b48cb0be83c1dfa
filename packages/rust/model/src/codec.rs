//! Binary encoding for persisted model artifacts (bincode).

use diagflow_shared::{DiagflowError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Current format version of scaler and model artifacts.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// Encode an artifact with bincode.
pub fn encode<T: Serialize>(what: &str, value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| DiagflowError::Serialization(format!("failed to encode {what}: {e}")))
}

/// Decode an artifact with bincode.
pub fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| DiagflowError::Serialization(format!("failed to decode {what}: {e}")))
}

/// Reject artifacts written by a different format version.
pub fn check_version(what: &str, found: u32) -> Result<()> {
    if found == ARTIFACT_SCHEMA_VERSION {
        Ok(())
    } else {
        Err(DiagflowError::schema(format!(
            "unsupported {what} schema_version: {found} (expected {ARTIFACT_SCHEMA_VERSION})"
        )))
    }
}
