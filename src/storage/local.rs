use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use super::{validate_key, BlobStore, ObjectStat};

/// Filesystem-backed bucket: `<root>/<bucket>/<key>`. Partial writes land in
/// `<root>/.<bucket>.tmp/` and are renamed into place.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    bucket_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Self {
        let root = root.as_ref();
        Self { bucket_dir: root.join(bucket), tmp_dir: root.join(format!(".{}.tmp", bucket)) }
    }

    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_dir.join(key))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.bucket_dir).ok()?;
        let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
        Some(parts.join("/"))
    }
}

fn stat_path(key: String, meta: &fs::Metadata) -> ObjectStat {
    let last_modified_ms = meta
        .modified()
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis())
        .unwrap_or_else(super::now_ms);
    ObjectStat { key, size: meta.len(), last_modified_ms }
}

impl BlobStore for LocalBlobStore {
    fn ensure_bucket(&self) -> Result<()> {
        if !self.bucket_dir.exists() {
            fs::create_dir_all(&self.bucket_dir)
                .with_context(|| format!("creating bucket dir {}", self.bucket_dir.display()))?;
            debug!(target: "storage", dir = %self.bucket_dir.display(), "bucket created");
        }
        Ok(())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(dir) = path.parent() { fs::create_dir_all(dir)?; }
        fs::create_dir_all(&self.tmp_dir)?;
        // Readers never see a partial object
        let tmp = self.tmp_dir.join(uuid::Uuid::new_v4().simple().to_string());
        fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("renaming into {}", path.display()));
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        let src = self.path_for(from)?;
        let dst = self.path_for(to)?;
        if !src.is_file() { return Err(anyhow!("source object not found: {}", from)); }
        if let Some(dir) = dst.parent() { fs::create_dir_all(dir)?; }
        fs::copy(&src, &dst).with_context(|| format!("copying {} to {}", from, to))?;
        Ok(())
    }

    fn stat(&self, key: &str) -> Result<Option<ObjectStat>> {
        let path = self.path_for(key)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(stat_path(key.to_string(), &meta))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectStat>> {
        if !self.bucket_dir.exists() { return Ok(Vec::new()); }
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&self.bucket_dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() { continue; }
            let Some(key) = self.key_for(entry.path()) else { continue; };
            if !key.starts_with(prefix) { continue; }
            if let Ok(meta) = entry.metadata() {
                out.push(stat_path(key, &meta));
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }
}
