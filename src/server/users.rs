use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::error::AppResult;
use crate::identity::{AdminOnly, Authenticated};
use crate::users::UserResponse;

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
}

pub async fn register(State(state): State<AppState>, Json(payload): Json<RegisterPayload>) -> AppResult<Json<UserResponse>> {
    state.users.register(&payload.username, &payload.password).map(Json)
}

pub async fn find_by_id(State(state): State<AppState>, AdminOnly(_admin): AdminOnly, Path(id): Path<i64>) -> AppResult<Json<UserResponse>> {
    state.users.find_by_id(id).map(Json)
}

pub async fn my_profile(State(state): State<AppState>, Authenticated(principal): Authenticated) -> AppResult<Json<UserResponse>> {
    state.users.my_profile(&principal).map(Json)
}
