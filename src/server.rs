//!
//! cloudstore HTTP server
//! ----------------------
//! Axum router and startup for the storage API.
//!
//! Responsibilities:
//! - Request ids on every response (`x-request-id`).
//! - Bearer-token authentication producing a per-request `RequestContext`.
//! - Auth endpoints (login, access-token reissue, refresh rotation, logout).
//! - User endpoints (register, admin lookup, own profile).
//! - File endpoints (upload, list, download, delete, rename).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::config::{AppConfig, StorageBackend, BUCKET};
use crate::files::FileStorageService;
use crate::identity::middleware::{authenticate, request_id};
use crate::identity::{Argon2PasswordEncoder, AuthSessionService, RefreshTokenStore, TokenCodec};
use crate::storage::{BlobStore, LocalBlobStore, MemoryBlobStore, SharedBlobStore};
use crate::users::{InMemoryUserRepository, UserService};

pub mod auth;
pub mod files;
pub mod users;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub sessions: AuthSessionService,
    pub files: FileStorageService,
    pub codec: Arc<TokenCodec>,
}

impl AppState {
    /// Wire the services together over the given codec and blob store, with an
    /// in-memory user repository and refresh-token store.
    pub fn new(codec: TokenCodec, blobs: SharedBlobStore) -> Self {
        let codec = Arc::new(codec);
        let users = UserService::new(Arc::new(InMemoryUserRepository::new()), Arc::new(Argon2PasswordEncoder));
        let sessions = AuthSessionService::new(users.clone(), codec.clone(), Arc::new(RefreshTokenStore::new()));
        let files = FileStorageService::new(users.clone(), blobs);
        Self { users, sessions, files, codec }
    }
}

pub fn router(state: AppState) -> Router {
    let codec = state.codec.clone();
    Router::new()
        .route("/", get(|| async { "cloudstore ok" }))
        .route("/auth/login", post(auth::login))
        .route("/auth/token", post(auth::access_token))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/user/register", post(users::register))
        .route("/user/get/{id}", get(users::find_by_id))
        .route("/user/myprofile", get(users::my_profile))
        .route("/file", post(files::upload).get(files::download).delete(files::delete).put(files::rename))
        .route("/list", get(files::list))
        .with_state(state)
        // Layers run outside-in: request id first, then authentication
        .layer(from_fn_with_state(codec, authenticate))
        .layer(from_fn(request_id))
}

fn log_startup(config: &AppConfig) {
    let cwd = std::env::current_dir().ok();
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "cloudstore starting: RUST_LOG='{}', cwd={:?}, http_port={}, data_dir={:?}, storage={:?}, access_ttl={}s, refresh_ttl={}s, bootstrap_admin={}",
        rust_log,
        cwd,
        config.http_port,
        config.data_dir,
        config.storage,
        config.access_ttl_secs,
        config.refresh_ttl_secs,
        config.admin.as_ref().map(|a| a.username.as_str()).unwrap_or("<none>")
    );
}

/// Build the state described by `config`: blob store, token codec, bootstrap admin.
pub fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let blobs: SharedBlobStore = match config.storage {
        StorageBackend::Local => {
            std::fs::create_dir_all(&config.data_dir)
                .with_context(|| format!("Failed to create or access data dir: {}", config.data_dir.display()))?;
            Arc::new(LocalBlobStore::new(&config.data_dir, BUCKET))
        }
        StorageBackend::Memory => Arc::new(MemoryBlobStore::new()),
    };
    blobs.ensure_bucket().context("While preparing the file bucket")?;

    let state = AppState::new(config.token_codec()?, blobs);
    if let Some(admin) = &config.admin {
        state
            .users
            .ensure_admin(&admin.username, &admin.password)
            .map_err(anyhow::Error::new)
            .with_context(|| format!("While ensuring bootstrap admin '{}'", admin.username))?;
    }
    Ok(state)
}

pub async fn run_with_config(config: AppConfig) -> anyhow::Result<()> {
    log_startup(&config);
    let state = build_state(&config)?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn run() -> anyhow::Result<()> {
    run_with_config(AppConfig::from_env()?).await
}
