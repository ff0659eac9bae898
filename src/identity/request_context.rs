use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::AuthError;
use super::principal::{Principal, Role};
use crate::error::AppError;

/// Outcome of the authentication pass for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    NoToken,
    TokenPresent,
    Validated,
    Rejected,
}

/// Per-request security context. Built once by the authentication middleware and
/// carried in the request extensions for the rest of the request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub request_id: Option<String>,
    pub auth_state: AuthState,
}

impl RequestContext {
    pub fn is_authenticated(&self) -> bool {
        self.principal.as_ref().map(|p| p.authenticated).unwrap_or(false)
    }

    pub fn principal(&self) -> Result<&Principal, AuthError> {
        self.principal
            .as_ref()
            .filter(|p| p.authenticated)
            .ok_or(AuthError::Unauthenticated)
    }

    /// Authenticated principal holding at least one of `roles`.
    pub fn require_any_role(&self, roles: &[Role]) -> Result<&Principal, AuthError> {
        let p = self.principal()?;
        if p.has_any_role(roles) { Ok(p) } else { Err(AuthError::MissingRole) }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestContext>().cloned().unwrap_or_default())
    }
}

/// Extractor for routes open to any authenticated user (USER or ADMIN).
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::from_request_parts(parts, state).await?;
        let p = ctx.require_any_role(&[Role::User, Role::Admin])?;
        Ok(Authenticated(p.clone()))
    }
}

/// Extractor for ADMIN-only routes.
#[derive(Debug, Clone)]
pub struct AdminOnly(pub Principal);

impl<S> FromRequestParts<S> for AdminOnly
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::from_request_parts(parts, state).await?;
        let p = ctx.require_any_role(&[Role::Admin])?;
        Ok(AdminOnly(p.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(roles: &[Role], authenticated: bool) -> RequestContext {
        RequestContext {
            principal: Some(Principal {
                user_id: 7,
                username: "erin".into(),
                roles: roles.iter().copied().collect(),
                authenticated,
            }),
            request_id: None,
            auth_state: AuthState::Validated,
        }
    }

    #[test]
    fn default_context_is_anonymous() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.auth_state, AuthState::NoToken);
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.principal().unwrap_err(), AuthError::Unauthenticated);
    }

    #[test]
    fn unauthenticated_principal_is_not_trusted() {
        let ctx = ctx_with(&[Role::Admin], false);
        assert_eq!(ctx.require_any_role(&[Role::Admin]).unwrap_err(), AuthError::Unauthenticated);
    }

    #[test]
    fn role_requirement() {
        let ctx = ctx_with(&[Role::User], true);
        assert!(ctx.require_any_role(&[Role::User, Role::Admin]).is_ok());
        assert_eq!(ctx.require_any_role(&[Role::Admin]).unwrap_err(), AuthError::MissingRole);
    }
}
