//! Request middleware: request ids and bearer-token authentication.
//!
//! The authentication pass is permissive. A missing or invalid token leaves the request
//! anonymous and the route extractors decide whether that is acceptable.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info, warn};

use super::request_context::{AuthState, RequestContext};
use super::token::{KeyClass, TokenCodec};

pub const AUTH_HEADER: &str = "authorization";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Bearer token from the `Authorization` header, if any.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTH_HEADER)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Run the authentication state machine over the request headers.
pub fn resolve_context(codec: &TokenCodec, headers: &HeaderMap, request_id: Option<String>) -> RequestContext {
    let mut ctx = RequestContext { principal: None, request_id, auth_state: AuthState::NoToken };
    let Some(token) = extract_bearer(headers) else {
        debug!(target: "auth.filter", "no token found in request");
        return ctx;
    };
    ctx.auth_state = AuthState::TokenPresent;
    if !codec.validate(token, KeyClass::Access) {
        warn!(target: "auth.filter", request_id = ctx.request_id.as_deref().unwrap_or("-"), "invalid access token");
        ctx.auth_state = AuthState::Rejected;
        return ctx;
    }
    match codec.claims(token, KeyClass::Access).and_then(|c| c.to_principal()) {
        Ok(principal) => {
            info!(target: "auth.filter", user = %principal.username, "authenticated request");
            ctx.principal = Some(principal);
            ctx.auth_state = AuthState::Validated;
        }
        Err(e) => {
            warn!(target: "auth.filter", "access token accepted but claims unusable: {}", e);
            ctx.auth_state = AuthState::Rejected;
        }
    }
    ctx
}

pub async fn authenticate(State(codec): State<Arc<TokenCodec>>, mut req: Request, next: Next) -> Response {
    let request_id = req.extensions().get::<RequestId>().map(|r| r.0.clone());
    let ctx = resolve_context(&codec, req.headers(), request_id);
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(id.clone()));
    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    resp
}
