use thiserror::Error;

use crate::error::AppError;

/// Failures raised by the authentication core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("wrong credentials")]
    WrongCredentials,
    #[error("refresh token is invalid or expired")]
    InvalidRefreshToken,
    #[error("token mismatch")]
    TokenMismatch,
    #[error("access token claims could not be read")]
    InvalidAccessToken,
    #[error("authentication required")]
    Unauthenticated,
    #[error("missing required role")]
    MissingRole,
    #[error("failed to issue token: {0}")]
    TokenIssue(String),
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::WrongCredentials => "wrong_credentials",
            AuthError::InvalidRefreshToken => "invalid_refresh_token",
            AuthError::TokenMismatch => "token_mismatch",
            AuthError::InvalidAccessToken => "invalid_access_token",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::MissingRole => "forbidden",
            AuthError::TokenIssue(_) => "token_issue",
            AuthError::InvalidKey(_) => "invalid_key",
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            AuthError::MissingRole => AppError::forbidden(code.to_string(), message),
            AuthError::TokenIssue(_) | AuthError::InvalidKey(_) => AppError::internal(code.to_string(), message),
            _ => AppError::auth(code.to_string(), message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(AppError::from(AuthError::WrongCredentials).http_status(), 401);
        assert_eq!(AppError::from(AuthError::TokenMismatch).http_status(), 401);
        assert_eq!(AppError::from(AuthError::Unauthenticated).http_status(), 401);
        assert_eq!(AppError::from(AuthError::MissingRole).http_status(), 403);
        assert_eq!(AppError::from(AuthError::TokenIssue("x".into())).http_status(), 500);
    }

    #[test]
    fn mismatch_message() {
        let e: AppError = AuthError::TokenMismatch.into();
        assert_eq!(e.message(), "token mismatch");
        assert_eq!(e.code_str(), "token_mismatch");
    }
}
