//! Artifact store: the key → blob handoff between pipeline stages.
//!
//! Every stage reads its inputs and writes its outputs through
//! [`ArtifactStore`], so the backing location can be swapped without touching
//! stage logic:
//! - [`FsArtifactStore`]: a directory on local disk (atomic temp + rename writes)
//! - [`MemoryArtifactStore`]: an in-process map, used by tests
//!
//! **Access rules:** a stage only writes the keys it owns and only reads
//! upstream keys. Writes are complete-or-absent; a reader never observes a
//! half-written artifact.

mod memory;

use std::path::{Path, PathBuf};

use diagflow_shared::{ArtifactKey, ArtifactLocation, DiagflowError, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

pub use memory::MemoryArtifactStore;

/// Key → blob storage shared by the pipeline stages.
pub trait ArtifactStore: Send + Sync {
    /// Write the complete artifact under `key`, replacing any previous generation.
    fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<ArtifactLocation>;

    /// Read the artifact stored under `key`; `NotFound` if absent.
    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>>;

    /// Whether an artifact exists under `key`.
    fn exists(&self, key: &ArtifactKey) -> bool;

    /// Resolve `key` to a displayable location without touching the store.
    fn locate(&self, key: &ArtifactKey) -> ArtifactLocation;

    /// Fail with `NotFound` unless `key` exists.
    fn require(&self, key: &ArtifactKey, what: &str) -> Result<()> {
        if self.exists(key) {
            Ok(())
        } else {
            Err(DiagflowError::not_found(what, self.locate(key).0))
        }
    }
}

/// Hex-encoded SHA-256 of an artifact's bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write `bytes` to `target` atomically (write to a dot-prefixed temp file, then rename).
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| DiagflowError::io(parent, e))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| DiagflowError::config(format!("invalid artifact path {target:?}")))?;
    let temp = parent.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| DiagflowError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| DiagflowError::io(target, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Artifact store rooted at a directory on local disk.
///
/// Relative keys resolve under the root; an absolute key addresses that file
/// directly, which lets a stage read an input produced outside the root.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| DiagflowError::io(root, e))?;
        let root = std::path::absolute(root).map_err(|e| DiagflowError::io(root, e))?;
        debug!(root = %root.display(), "opened artifact store");
        Ok(Self { root })
    }

    /// Absolute root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path backing `key`.
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.as_str())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, key: &ArtifactKey, bytes: &[u8]) -> Result<ArtifactLocation> {
        let path = self.path_for(key);
        write_atomic(&path, bytes)?;
        debug!(key = %key, size = bytes.len(), "wrote artifact");
        Ok(self.locate(key))
    }

    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DiagflowError::not_found(
                format!("artifact '{key}'"),
                path.display().to_string(),
            )),
            Err(e) => Err(DiagflowError::io(path, e)),
        }
    }

    fn exists(&self, key: &ArtifactKey) -> bool {
        self.path_for(key).is_file()
    }

    fn locate(&self, key: &ArtifactKey) -> ArtifactLocation {
        ArtifactLocation(self.path_for(key).display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "diagflow-storage-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn put_then_get_roundtrip() {
        let tmp = temp_dir();
        let store = FsArtifactStore::open(&tmp).unwrap();
        let key = ArtifactKey::metrics();

        let location = store.put(&key, b"{\"accuracy\": 1.0}").unwrap();
        assert!(location.0.ends_with("metrics.json"));
        assert!(store.exists(&key));
        assert_eq!(store.get(&key).unwrap(), b"{\"accuracy\": 1.0}");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_key_is_not_found() {
        let tmp = temp_dir();
        let store = FsArtifactStore::open(&tmp).unwrap();

        let err = store.get(&ArtifactKey::model()).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
        assert!(!store.exists(&ArtifactKey::model()));
        assert_eq!(
            store.require(&ArtifactKey::model(), "model").unwrap_err().kind(),
            "NotFound"
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn put_overwrites_without_temp_files() {
        let tmp = temp_dir();
        let store = FsArtifactStore::open(&tmp).unwrap();
        let key = ArtifactKey::raw_dataset();

        store.put(&key, b"first").unwrap();
        store.put(&key, b"second").unwrap();
        assert_eq!(store.get(&key).unwrap(), b"second");

        for entry in std::fs::read_dir(&tmp).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn nested_and_absolute_keys() {
        let tmp = temp_dir();
        let store = FsArtifactStore::open(tmp.join("store")).unwrap();

        let nested = ArtifactKey::new("runs/a/model.bin");
        store.put(&nested, b"m").unwrap();
        assert!(tmp.join("store/runs/a/model.bin").is_file());

        let outside = tmp.join("outside.csv");
        std::fs::write(&outside, b"x,y\n").unwrap();
        let abs = ArtifactKey::new(outside.display().to_string());
        assert_eq!(store.get(&abs).unwrap(), b"x,y\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn sha256_is_hex() {
        let digest = sha256_hex(b"hello");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
