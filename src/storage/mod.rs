//!
//! cloudstore blob storage
//! -----------------------
//! Object storage behind a small trait. File content lives in a single bucket and is
//! addressed by string keys of the form `<user id>/<filename>`; which user owns which
//! filename is tracked separately on the user record.
//!
//! Two backends are provided:
//! - `LocalBlobStore`: one file per object under `<root>/<bucket>/`, last-modified time
//!   taken from the filesystem.
//! - `MemoryBlobStore`: a map guarded by a lock, used in tests and throwaway servers.
//!
//! Backends report failures through `anyhow::Result`; callers translate them into
//! `AppError` at the service boundary.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

mod local;
mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

/// Metadata for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStat {
    pub key: String,
    pub size: u64,
    /// Epoch milliseconds.
    pub last_modified_ms: i64,
}

pub trait BlobStore: Send + Sync {
    /// Create the bucket if it does not exist yet.
    fn ensure_bucket(&self) -> Result<()>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Returns false when the object did not exist.
    fn delete(&self, key: &str) -> Result<bool>;
    /// Fails when `from` does not exist. Overwrites `to`.
    fn copy(&self, from: &str, to: &str) -> Result<()>;
    fn stat(&self, key: &str) -> Result<Option<ObjectStat>>;
    /// All objects whose key starts with `prefix`, sorted by key.
    fn list(&self, prefix: &str) -> Result<Vec<ObjectStat>>;
}

pub type SharedBlobStore = Arc<dyn BlobStore>;

/// Reject keys that could escape the bucket on a filesystem backend.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() { bail!("empty object key"); }
    if key.starts_with('/') || key.contains('\\') { bail!("object key must be relative: {}", key); }
    if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        bail!("invalid object key: {}", key);
    }
    Ok(())
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation() {
        assert!(validate_key("1/a.txt").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("1/../2/a.txt").is_err());
        assert!(validate_key("1//a.txt").is_err());
        assert!(validate_key("1\\a.txt").is_err());
    }

    // Same behavioural contract for every backend
    fn exercise(store: &dyn BlobStore) {
        store.ensure_bucket().unwrap();
        store.put("1/a.txt", b"hello").unwrap();
        store.put("1/b.bin", b"xy").unwrap();
        store.put("2/a.txt", b"other").unwrap();

        assert_eq!(store.get("1/a.txt").unwrap().as_deref(), Some(&b"hello"[..]));
        assert!(store.get("1/zzz").unwrap().is_none());

        let st = store.stat("1/b.bin").unwrap().unwrap();
        assert_eq!(st.size, 2);
        assert!(st.last_modified_ms > 0);

        let keys: Vec<String> = store.list("1/").unwrap().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["1/a.txt".to_string(), "1/b.bin".to_string()]);

        store.copy("1/a.txt", "1/c.txt").unwrap();
        assert_eq!(store.get("1/c.txt").unwrap().as_deref(), Some(&b"hello"[..]));
        assert!(store.copy("1/missing", "1/d.txt").is_err());

        assert!(store.delete("1/a.txt").unwrap());
        assert!(!store.delete("1/a.txt").unwrap());
        assert!(store.stat("1/a.txt").unwrap().is_none());
        assert_eq!(store.list("2/").unwrap().len(), 1);
    }

    #[test]
    fn memory_backend_contract() {
        exercise(&MemoryBlobStore::new());
    }

    #[test]
    fn local_backend_contract() {
        let tmp = tempfile::tempdir().unwrap();
        exercise(&LocalBlobStore::new(tmp.path(), "files"));
    }
}
