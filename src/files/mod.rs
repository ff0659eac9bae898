//! Per-user file operations on top of the blob store.
//!
//! Every operation resolves the caller from the request principal, and every
//! operation on an existing file goes through `assert_owns` first. Blob keys are
//! `<user id>/<filename>`, so two users may hold files with the same name.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::identity::{assert_owns, Principal};
use crate::storage::SharedBlobStore;
use crate::users::{User, UserService};

pub const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDto {
    pub filename: String,
    pub file_type: String,
    /// Epoch milliseconds of the last write.
    pub edited_at: i64,
    pub size: u64,
}

/// Extension after the last dot, or "unknown".
pub fn file_type_of(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_string(),
        _ => "unknown".to_string(),
    }
}

pub fn validate_filename(name: &str) -> AppResult<()> {
    let bad = name.trim().is_empty()
        || name.chars().count() > MAX_FILENAME_LEN
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name.contains("..")
        || name.chars().any(|c| c.is_control());
    if bad {
        return Err(AppError::user("invalid_filename".to_string(), format!("Invalid file name: {}", name)));
    }
    Ok(())
}

fn blob_key(user_id: i64, filename: &str) -> String {
    format!("{}/{}", user_id, filename)
}

fn storage_err(op: &str, e: anyhow::Error) -> AppError {
    error!(target: "files", op, error = %e, "blob store failure");
    AppError::io("storage_unavailable".to_string(), format!("Failed to {} file", op))
}

#[derive(Clone)]
pub struct FileStorageService {
    users: UserService,
    blobs: SharedBlobStore,
}

impl FileStorageService {
    pub fn new(users: UserService, blobs: SharedBlobStore) -> Self {
        Self { users, blobs }
    }

    fn caller(&self, principal: &Principal) -> AppResult<User> {
        self.users.get_by_id(principal.user_id)
    }

    /// Store `bytes` under `requested_name`, or under a generated `<uuid>.<ext>` name when
    /// none is given. Uploading a name the caller already owns replaces the content.
    pub fn upload(&self, principal: &Principal, original_name: &str, requested_name: Option<&str>, bytes: &[u8]) -> AppResult<String> {
        debug!(target: "files", user = %principal.username, original = original_name, "upload");
        let user = self.caller(principal)?;
        if bytes.is_empty() {
            warn!(target: "files", user = %user.username, "empty upload");
            return Err(AppError::user("file_empty".to_string(), "File is empty".to_string()));
        }
        let filename = match requested_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => generated_name(original_name),
        };
        validate_filename(&filename)?;
        self.blobs.ensure_bucket().map_err(|e| storage_err("upload", e))?;
        self.blobs.put(&blob_key(user.id, &filename), bytes).map_err(|e| storage_err("upload", e))?;
        self.users.add_file(user.id, &filename)?;
        info!(target: "files", user = %user.username, file = %filename, size = bytes.len(), "file uploaded");
        Ok(filename)
    }

    pub fn list(&self, principal: &Principal, limit: i64) -> AppResult<Vec<FileDto>> {
        if limit <= 0 {
            warn!(target: "files", limit, "non-positive list limit");
            return Err(AppError::user("invalid_limit".to_string(), "Limit must be greater than 0".to_string()));
        }
        let user = self.caller(principal)?;
        let prefix = format!("{}/", user.id);
        let stats = self.blobs.list(&prefix).map_err(|e| storage_err("list", e))?;
        let mut out: Vec<FileDto> = stats
            .into_iter()
            .filter_map(|st| {
                let name = st.key.strip_prefix(&prefix)?.to_string();
                if !user.files.contains(&name) { return None; }
                Some(FileDto { file_type: file_type_of(&name), filename: name, edited_at: st.last_modified_ms, size: st.size })
            })
            .collect();
        out.sort_by(|a, b| a.filename.cmp(&b.filename));
        out.truncate(limit as usize);
        info!(target: "files", user = %user.username, count = out.len(), "files listed");
        Ok(out)
    }

    pub fn download(&self, principal: &Principal, filename: &str) -> AppResult<Vec<u8>> {
        let user = self.caller(principal)?;
        assert_owns(&user, filename)?;
        let bytes = self
            .blobs
            .get(&blob_key(user.id, filename))
            .map_err(|e| storage_err("download", e))?
            .ok_or_else(|| missing_blob(filename))?;
        info!(target: "files", user = %user.username, file = filename, "file downloaded");
        Ok(bytes)
    }

    pub fn delete(&self, principal: &Principal, filename: &str) -> AppResult<()> {
        let user = self.caller(principal)?;
        assert_owns(&user, filename)?;
        let removed = self.blobs.delete(&blob_key(user.id, filename)).map_err(|e| storage_err("delete", e))?;
        if !removed {
            return Err(missing_blob(filename));
        }
        self.users.remove_file(user.id, filename)?;
        info!(target: "files", user = %user.username, file = filename, "file deleted");
        Ok(())
    }

    pub fn rename(&self, principal: &Principal, old_name: &str, new_name: &str) -> AppResult<()> {
        let user = self.caller(principal)?;
        assert_owns(&user, old_name)?;
        let new_name = new_name.trim();
        validate_filename(new_name)?;
        if new_name == old_name {
            return Ok(());
        }
        if user.files.contains(new_name) {
            return Err(AppError::conflict("file_exists".to_string(), format!("File already exists: {}", new_name)));
        }
        let from = blob_key(user.id, old_name);
        if self.blobs.stat(&from).map_err(|e| storage_err("rename", e))?.is_none() {
            return Err(missing_blob(old_name));
        }
        self.blobs.copy(&from, &blob_key(user.id, new_name)).map_err(|e| storage_err("rename", e))?;
        self.blobs.delete(&from).map_err(|e| storage_err("rename", e))?;
        self.users.remove_file(user.id, old_name)?;
        self.users.add_file(user.id, new_name)?;
        info!(target: "files", user = %user.username, from = old_name, to = new_name, "file renamed");
        Ok(())
    }
}

fn missing_blob(filename: &str) -> AppError {
    AppError::not_found("file_not_found".to_string(), format!("File not found: {}", filename))
}

fn generated_name(original_name: &str) -> String {
    let ext = std::path::Path::new(original_name)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .filter(|e| !e.is_empty());
    match ext {
        Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext),
        None => uuid::Uuid::new_v4().to_string(),
    }
}
