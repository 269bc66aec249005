//! Persisted content-model-id → remote-id mapping with content digests.
//!
//! The resource map is what makes deployment idempotent across runs: every
//! successfully deployed entity records its remote Canvas id and the SHA-256
//! digest of the payload it was deployed with. A later run compares digests
//! and skips entities whose content has not changed.
//!
//! Lifecycle contract: the whole map is loaded once at the start of a run
//! and persisted only after verified successful entity operations, so an
//! aborted run leaves a valid prefix behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::api::RemoteId;
use crate::error::{CanvasError, CanvasResult};

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = CanvasError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CanvasError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One deployed entity's remote identity and last-deployed content digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub remote_id: RemoteId,
    pub digest: ContentDigest,
}

/// The id/digest table keyed by content-model id.
///
/// Keys use a `kind:id` convention (`module:intro`, `item:quiz-1`,
/// `link:quiz-1`, `prereqs:intro`, `gradebook:XP`). Entries are only added
/// or replaced, never silently deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMap {
    entries: BTreeMap<String, ResourceEntry>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ResourceEntry> {
        self.entries.get(key)
    }

    pub fn remote_id(&self, key: &str) -> Option<RemoteId> {
        self.entries.get(key).map(|e| e.remote_id)
    }

    /// Record a verified-successful deployment of `key`.
    pub fn record(&mut self, key: impl Into<String>, remote_id: RemoteId, digest: ContentDigest) {
        self.entries.insert(
            key.into(),
            ResourceEntry { remote_id, digest },
        );
    }

    /// Whether `key` is already deployed with exactly this content digest.
    pub fn is_current(&self, key: &str, digest: &ContentDigest) -> bool {
        self.entries.get(key).is_some_and(|e| &e.digest == digest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in stable key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResourceEntry)> {
        self.entries.iter()
    }
}

/// Load/persist seam for the resource map.
///
/// `load` reads the entire map at the start of a run; `persist` writes the
/// full map after successful entity operations (checkpoint granularity is
/// one entity).
pub trait ResourceMapStore: Send + Sync {
    fn load(&self) -> CanvasResult<ResourceMap>;
    fn persist(&self, map: &ResourceMap) -> CanvasResult<()>;
}

/// Filesystem-backed store: one pretty-printed JSON file, written atomically
/// (temp file in the same directory, then rename).
pub struct FsResourceMapStore {
    path: PathBuf,
}

impl FsResourceMapStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ResourceMapStore for FsResourceMapStore {
    fn load(&self) -> CanvasResult<ResourceMap> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ResourceMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, map: &ResourceMap) -> CanvasResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(map)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryResourceMapStore {
    inner: Mutex<ResourceMap>,
}

impl MemoryResourceMapStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceMapStore for MemoryResourceMapStore {
    fn load(&self) -> CanvasResult<ResourceMap> {
        Ok(self.inner.lock().unwrap().clone())
    }

    fn persist(&self, map: &ResourceMap) -> CanvasResult<()> {
        *self.inner.lock().unwrap() = map.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let a = ContentDigest::from_bytes(b"module payload");
        let b = ContentDigest::from_bytes(b"module payload");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_digest_try_from_rejects_garbage() {
        assert!(ContentDigest::try_from("not-hex".to_string()).is_err());
        let valid = "a".repeat(64);
        assert!(ContentDigest::try_from(valid).is_ok());
    }

    #[test]
    fn test_map_record_and_is_current() {
        let mut map = ResourceMap::new();
        let digest = ContentDigest::from_bytes(b"v1");
        map.record("module:intro", 101, digest.clone());

        assert_eq!(map.remote_id("module:intro"), Some(101));
        assert!(map.is_current("module:intro", &digest));
        assert!(!map.is_current("module:intro", &ContentDigest::from_bytes(b"v2")));
        assert!(!map.is_current("module:other", &digest));
    }

    #[test]
    fn test_record_replaces_digest_on_update() {
        let mut map = ResourceMap::new();
        map.record("item:a", 7, ContentDigest::from_bytes(b"v1"));
        map.record("item:a", 7, ContentDigest::from_bytes(b"v2"));
        assert_eq!(map.len(), 1);
        assert!(map.is_current("item:a", &ContentDigest::from_bytes(b"v2")));
    }

    #[test]
    fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResourceMapStore::new(dir.path().join("resource_map.json"));

        // Missing file loads as an empty map.
        assert!(store.load().unwrap().is_empty());

        let mut map = ResourceMap::new();
        map.record("module:intro", 101, ContentDigest::from_bytes(b"v1"));
        map.record("item:quiz-1", 202, ContentDigest::from_bytes(b"q1"));
        store.persist(&map).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, map);
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryResourceMapStore::new();
        let mut map = ResourceMap::new();
        map.record("gradebook:XP", 9, ContentDigest::from_bytes(b"col"));
        store.persist(&map).unwrap();
        assert_eq!(store.load().unwrap().remote_id("gradebook:XP"), Some(9));
    }
}
