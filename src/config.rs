//! Runtime configuration read from `CLOUDSTORE_*` environment variables.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

use crate::identity::{SigningKey, TokenCodec, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};

pub const ENV_HTTP_PORT: &str = "CLOUDSTORE_HTTP_PORT";
pub const ENV_DATA_DIR: &str = "CLOUDSTORE_DATA_DIR";
pub const ENV_STORAGE: &str = "CLOUDSTORE_STORAGE";
pub const ENV_ACCESS_SECRET: &str = "CLOUDSTORE_JWT_ACCESS_SECRET";
pub const ENV_REFRESH_SECRET: &str = "CLOUDSTORE_JWT_REFRESH_SECRET";
pub const ENV_ACCESS_TTL: &str = "CLOUDSTORE_ACCESS_TTL_SECS";
pub const ENV_REFRESH_TTL: &str = "CLOUDSTORE_REFRESH_TTL_SECS";
pub const ENV_ADMIN_USERNAME: &str = "CLOUDSTORE_ADMIN_USERNAME";
pub const ENV_ADMIN_PASSWORD: &str = "CLOUDSTORE_ADMIN_PASSWORD";

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const BUCKET: &str = "files";
/// Upper bound for token lifetimes: one year.
pub const MAX_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Memory,
}

#[derive(Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    pub data_dir: PathBuf,
    pub storage: StorageBackend,
    pub access_key: SigningKey,
    pub refresh_key: SigningKey,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub admin: Option<AdminBootstrap>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; missing optional keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let http_port = match get(ENV_HTTP_PORT) {
            Some(v) => v.parse::<u16>().with_context(|| format!("{} is not a port: {}", ENV_HTTP_PORT, v))?,
            None => DEFAULT_HTTP_PORT,
        };
        let data_dir = PathBuf::from(get(ENV_DATA_DIR).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));
        let storage = match get(ENV_STORAGE).as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("local") => StorageBackend::Local,
            Some("memory") => StorageBackend::Memory,
            Some(other) => bail!("{} must be 'local' or 'memory', got '{}'", ENV_STORAGE, other),
        };

        let access_key = required_key(get(ENV_ACCESS_SECRET), ENV_ACCESS_SECRET)?;
        let refresh_key = required_key(get(ENV_REFRESH_SECRET), ENV_REFRESH_SECRET)?;
        if access_key == refresh_key {
            bail!("{} and {} must be different secrets", ENV_ACCESS_SECRET, ENV_REFRESH_SECRET);
        }

        let access_ttl_secs = ttl(get(ENV_ACCESS_TTL), ENV_ACCESS_TTL, DEFAULT_ACCESS_TTL_SECS)?;
        let refresh_ttl_secs = ttl(get(ENV_REFRESH_TTL), ENV_REFRESH_TTL, DEFAULT_REFRESH_TTL_SECS)?;

        let admin = match (get(ENV_ADMIN_USERNAME), lookup(ENV_ADMIN_PASSWORD)) {
            (Some(username), Some(password)) if !password.is_empty() => Some(AdminBootstrap { username, password }),
            (Some(_), _) => bail!("{} is set but {} is missing", ENV_ADMIN_USERNAME, ENV_ADMIN_PASSWORD),
            (None, _) => None,
        };

        Ok(Self { http_port, data_dir, storage, access_key, refresh_key, access_ttl_secs, refresh_ttl_secs, admin })
    }

    pub fn token_codec(&self) -> Result<TokenCodec> {
        TokenCodec::new(
            &self.access_key,
            &self.refresh_key,
            chrono::Duration::seconds(self.access_ttl_secs),
            chrono::Duration::seconds(self.refresh_ttl_secs),
        )
        .map_err(|e| anyhow!(e))
    }
}

fn required_key(value: Option<String>, name: &str) -> Result<SigningKey> {
    let value = value.ok_or_else(|| anyhow!("{} is required (base64, at least {} bytes)", name, SigningKey::MIN_LEN))?;
    SigningKey::from_base64(&value).with_context(|| format!("invalid {}", name))
}

fn ttl(value: Option<String>, name: &str, default: i64) -> Result<i64> {
    let Some(v) = value else { return Ok(default) };
    let secs = v.parse::<i64>().with_context(|| format!("{} is not a number: {}", name, v))?;
    if secs <= 0 {
        bail!("{} must be greater than 0", name);
    }
    if secs > MAX_TTL_SECS {
        bail!("{} must be at most {} seconds", name, MAX_TTL_SECS);
    }
    Ok(secs)
}
