//! In-memory artifact store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use diagflow_shared::{ArtifactKey, ArtifactLocation, DiagflowError, Result};

use crate::ArtifactStore;

/// Artifact store backed by a map; nothing outlives the value.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned map still holds complete blobs; puts replace whole entries.
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<ArtifactLocation> {
        self.lock().insert(key.as_str().to_string(), bytes.to_vec());
        Ok(self.locate(key))
    }

    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        self.lock()
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| DiagflowError::not_found(format!("artifact '{key}'"), self.locate(key).0))
    }

    fn exists(&self, key: &ArtifactKey) -> bool {
        self.lock().contains_key(key.as_str())
    }

    fn locate(&self, key: &ArtifactKey) -> ArtifactLocation {
        ArtifactLocation(format!("memory://{key}"))
    }
}
