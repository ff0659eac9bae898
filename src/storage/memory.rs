use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use parking_lot::RwLock;

use super::{now_ms, validate_key, BlobStore, ObjectStat};

#[derive(Debug, Clone)]
struct Object {
    bytes: Vec<u8>,
    last_modified_ms: i64,
}

/// In-process bucket. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, Object>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn ensure_bucket(&self) -> Result<()> {
        Ok(())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.objects.write().insert(key.to_string(), Object { bytes: bytes.to_vec(), last_modified_ms: now_ms() });
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.objects.read().get(key).map(|o| o.bytes.clone()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.objects.write().remove(key).is_some())
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        validate_key(from)?;
        validate_key(to)?;
        let mut objects = self.objects.write();
        let src = objects.get(from).cloned().ok_or_else(|| anyhow!("source object not found: {}", from))?;
        objects.insert(to.to_string(), Object { bytes: src.bytes, last_modified_ms: now_ms() });
        Ok(())
    }

    fn stat(&self, key: &str) -> Result<Option<ObjectStat>> {
        validate_key(key)?;
        Ok(self.objects.read().get(key).map(|o| ObjectStat {
            key: key.to_string(),
            size: o.bytes.len() as u64,
            last_modified_ms: o.last_modified_ms,
        }))
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectStat>> {
        let objects = self.objects.read();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, o)| ObjectStat { key: k.clone(), size: o.bytes.len() as u64, last_modified_ms: o.last_modified_ms })
            .collect())
    }
}
