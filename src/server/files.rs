//! File endpoints. All of them require an authenticated USER or ADMIN.

use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::files::FileDto;
use crate::identity::Authenticated;

#[derive(Debug, Deserialize)]
pub struct FilenameQuery {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct RenamePayload {
    pub filename: String,
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::user("invalid_multipart".to_string(), format!("Invalid multipart body: {}", e))
}

/// Multipart form with a `file` part and an optional `filename` text part.
pub async fn upload(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    mut multipart: Multipart,
) -> AppResult<String> {
    let mut content: Option<(String, Vec<u8>)> = None;
    let mut requested: Option<String> = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let original = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                content = Some((original, bytes.to_vec()));
            }
            Some("filename") => {
                requested = Some(field.text().await.map_err(bad_multipart)?);
            }
            other => debug!(target: "files", field = ?other, "ignoring multipart field"),
        }
    }
    let Some((original, bytes)) = content else {
        return Err(AppError::user("file_missing".to_string(), "No file provided".to_string()));
    };
    let name = state.files.upload(&principal, &original, requested.as_deref(), &bytes)?;
    Ok(format!("File uploaded successfully: {}", name))
}

pub async fn list(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Vec<FileDto>>> {
    state.files.list(&principal, q.limit).map(Json)
}

pub async fn download(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(q): Query<FilenameQuery>,
) -> AppResult<impl IntoResponse> {
    let bytes = state.files.download(&principal, &q.filename)?;
    let disposition = format!("attachment; filename=\"{}\"", q.filename.replace('"', "_"));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(q): Query<FilenameQuery>,
) -> AppResult<&'static str> {
    state.files.delete(&principal, &q.filename)?;
    Ok("File deleted successfully")
}

pub async fn rename(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Query(q): Query<FilenameQuery>,
    Json(payload): Json<RenamePayload>,
) -> AppResult<&'static str> {
    state.files.rename(&principal, &q.filename, &payload.filename)?;
    Ok("File edited successfully")
}
