//! `/auth/*` handlers.

use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::error::AppResult;
use crate::identity::{Authenticated, LoginRequest, RefreshRequest, TokenResponse};

pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> AppResult<Json<TokenResponse>> {
    state.sessions.login(&payload).map(Json)
}

/// New access token for a current refresh token; the refresh token is not rotated.
pub async fn access_token(State(state): State<AppState>, Json(payload): Json<RefreshRequest>) -> AppResult<Json<TokenResponse>> {
    state.sessions.reissue_access_token(&payload.refresh_token).map(Json)
}

pub async fn refresh(State(state): State<AppState>, Json(payload): Json<RefreshRequest>) -> AppResult<Json<TokenResponse>> {
    state.sessions.refresh(&payload.refresh_token).map(Json)
}

pub async fn logout(State(state): State<AppState>, Authenticated(principal): Authenticated) -> Json<serde_json::Value> {
    state.sessions.logout(&principal);
    Json(serde_json::json!({"status": "ok"}))
}
