use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::AuthError;
use super::principal::Principal;
use super::refresh_store::RefreshTokenStore;
use super::request_context::RequestContext;
use super::token::{KeyClass, TokenCodec};
use crate::error::{AppError, AppResult};
use crate::tprintln;
use crate::users::UserService;

/// Well-formed Argon2id PHC string that matches no password. Verified against on the
/// unknown-user path so both login failures cost the same hashing work.
const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Token pair handed back by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(rename = "type")]
    pub token_type: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self { token_type: "Bearer".to_string(), access_token, refresh_token }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Login, logout, access-token reissue and refresh-token rotation.
#[derive(Clone)]
pub struct AuthSessionService {
    users: UserService,
    codec: Arc<TokenCodec>,
    store: Arc<RefreshTokenStore>,
}

impl AuthSessionService {
    pub fn new(users: UserService, codec: Arc<TokenCodec>, store: Arc<RefreshTokenStore>) -> Self {
        Self { users, codec, store }
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    pub fn refresh_store(&self) -> &Arc<RefreshTokenStore> {
        &self.store
    }

    pub fn login(&self, req: &LoginRequest) -> AppResult<TokenResponse> {
        // Unknown users get the same answer as a wrong password
        let user = match self.users.get_by_username(&req.username) {
            Ok(u) => u,
            Err(AppError::NotFound { .. }) => {
                let _ = self.users.encoder().verify(&req.password, DUMMY_PASSWORD_HASH);
                warn!(target: "auth.session", user = %req.username, "login for unknown user");
                return Err(AuthError::WrongCredentials.into());
            }
            Err(e) => return Err(e),
        };
        if !self.users.encoder().verify(&req.password, &user.password_hash) {
            warn!(target: "auth.session", user = %req.username, "invalid password");
            return Err(AuthError::WrongCredentials.into());
        }
        let access = self.codec.issue_access_token(&user)?;
        let refresh = self.codec.issue_refresh_token(&user)?;
        self.store.put(&user.username, &refresh);
        info!(target: "auth.session", user = %user.username, "user authenticated");
        Ok(TokenResponse::new(Some(access), Some(refresh)))
    }

    /// Drop the stored refresh token. Calling it twice is fine.
    pub fn logout(&self, principal: &Principal) {
        let removed = self.store.remove(&principal.username);
        tprintln!("auth.logout user={} removed={}", principal.username, removed);
        info!(target: "auth.session", user = %principal.username, "refresh token removed");
    }

    /// Subject of a refresh token that is valid and still the stored one.
    fn current_subject(&self, refresh_token: &str) -> Result<String, AuthError> {
        if !self.codec.validate(refresh_token, KeyClass::Refresh) {
            return Err(AuthError::InvalidRefreshToken);
        }
        let username = self.codec.claims(refresh_token, KeyClass::Refresh)?.sub;
        if !self.store.is_current(&username, refresh_token) {
            warn!(target: "auth.session", user = %username, "refresh token is not the current one");
            return Err(AuthError::TokenMismatch);
        }
        Ok(username)
    }

    pub fn reissue_access_token(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let username = self.current_subject(refresh_token)?;
        let user = self.users.get_by_username(&username)?;
        let access = self.codec.issue_access_token(&user)?;
        info!(target: "auth.session", user = %username, "issued new access token");
        Ok(TokenResponse::new(Some(access), None))
    }

    pub fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let username = self.current_subject(refresh_token)?;
        let user = self.users.get_by_username(&username)?;
        let access = self.codec.issue_access_token(&user)?;
        let rotated = self.codec.issue_refresh_token(&user)?;
        // Another refresh may have rotated the token since the check above
        if !self.store.replace_if_current(&username, refresh_token, &rotated) {
            warn!(target: "auth.session", user = %username, "lost refresh rotation race");
            return Err(AuthError::TokenMismatch.into());
        }
        info!(target: "auth.session", user = %username, "rotated refresh token");
        Ok(TokenResponse::new(Some(access), Some(rotated)))
    }

    pub fn current_principal<'a>(&self, ctx: &'a RequestContext) -> Result<&'a Principal, AuthError> {
        ctx.principal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::token::tests::test_codec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::identity::{Argon2PasswordEncoder, AuthState, PasswordEncoder};
    use crate::users::InMemoryUserRepository;

    fn setup() -> AuthSessionService {
        let users = UserService::new(Arc::new(InMemoryUserRepository::new()), Arc::new(Argon2PasswordEncoder));
        users.register("alice", "pw1x").unwrap();
        AuthSessionService::new(users, Arc::new(test_codec()), Arc::new(RefreshTokenStore::new()))
    }

    fn login(svc: &AuthSessionService) -> TokenResponse {
        svc.login(&LoginRequest { username: "alice".into(), password: "pw1x".into() }).unwrap()
    }

    #[test]
    fn login_issues_and_stores_tokens() {
        let svc = setup();
        let resp = login(&svc);
        assert_eq!(resp.token_type, "Bearer");
        let rt = resp.refresh_token.unwrap();
        assert!(svc.codec().validate(&rt, KeyClass::Refresh));
        assert_eq!(svc.refresh_store().get("alice"), Some(rt));
        let claims = svc.codec().claims(&resp.access_token.unwrap(), KeyClass::Access).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.id, Some(1));
    }

    #[test]
    fn wrong_password_and_unknown_user_look_the_same() {
        let svc = setup();
        let a = svc.login(&LoginRequest { username: "alice".into(), password: "nope".into() }).unwrap_err();
        let b = svc.login(&LoginRequest { username: "mallory".into(), password: "nope".into() }).unwrap_err();
        assert_eq!(a, b);
        assert_eq!(a.http_status(), 401);
    }

    struct CountingEncoder {
        verifies: AtomicUsize,
    }

    impl PasswordEncoder for CountingEncoder {
        fn hash(&self, password: &str) -> anyhow::Result<String> {
            Argon2PasswordEncoder.hash(password)
        }

        fn verify(&self, password: &str, hash: &str) -> bool {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            Argon2PasswordEncoder.verify(password, hash)
        }
    }

    #[test]
    fn unknown_user_still_pays_for_a_password_check() {
        let encoder = Arc::new(CountingEncoder { verifies: AtomicUsize::new(0) });
        let users = UserService::new(Arc::new(InMemoryUserRepository::new()), encoder.clone());
        let svc = AuthSessionService::new(users, Arc::new(test_codec()), Arc::new(RefreshTokenStore::new()));
        let err = svc.login(&LoginRequest { username: "ghost".into(), password: "pw1x".into() }).unwrap_err();
        assert_eq!(err.code_str(), "wrong_credentials");
        assert_eq!(encoder.verifies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dummy_hash_parses_and_matches_nothing() {
        assert!(password_hash::PasswordHash::new(DUMMY_PASSWORD_HASH).is_ok());
        assert!(!Argon2PasswordEncoder.verify("", DUMMY_PASSWORD_HASH));
        assert!(!Argon2PasswordEncoder.verify("pw1x", DUMMY_PASSWORD_HASH));
    }

    #[test]
    fn reissue_keeps_refresh_token() {
        let svc = setup();
        let rt = login(&svc).refresh_token.unwrap();
        let resp = svc.reissue_access_token(&rt).unwrap();
        assert!(resp.refresh_token.is_none());
        assert_eq!(svc.codec().claims(&resp.access_token.unwrap(), KeyClass::Access).unwrap().sub, "alice");
        assert!(svc.reissue_access_token(&rt).is_ok());
    }

    #[test]
    fn rotation_invalidates_previous_refresh_token() {
        let svc = setup();
        let rt1 = login(&svc).refresh_token.unwrap();
        let rt2 = svc.refresh(&rt1).unwrap().refresh_token.unwrap();
        assert_ne!(rt1, rt2);
        assert_eq!(svc.reissue_access_token(&rt1).unwrap_err().code_str(), "token_mismatch");
        assert!(svc.reissue_access_token(&rt2).is_ok());
        assert!(svc.refresh(&rt1).is_err());
    }

    #[test]
    fn logout_invalidates_refresh_token() {
        let svc = setup();
        let rt = login(&svc).refresh_token.unwrap();
        let principal = Principal { user_id: 1, username: "alice".into(), roles: Default::default(), authenticated: true };
        svc.logout(&principal);
        svc.logout(&principal);
        assert_eq!(svc.reissue_access_token(&rt).unwrap_err().http_status(), 401);
        assert!(svc.refresh(&rt).is_err());
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let svc = setup();
        let at = login(&svc).access_token.unwrap();
        assert_eq!(svc.reissue_access_token(&at).unwrap_err().code_str(), "invalid_refresh_token");
    }

    #[test]
    fn current_principal_requires_authentication() {
        let svc = setup();
        assert_eq!(svc.current_principal(&RequestContext::default()).unwrap_err(), AuthError::Unauthenticated);
        let ctx = RequestContext {
            principal: Some(Principal { user_id: 1, username: "alice".into(), roles: Default::default(), authenticated: true }),
            request_id: None,
            auth_state: AuthState::Validated,
        };
        assert_eq!(svc.current_principal(&ctx).unwrap().username, "alice");
    }

    #[test]
    fn token_response_shape() {
        let v = serde_json::to_value(TokenResponse::new(Some("a".into()), None)).unwrap();
        assert_eq!(v, serde_json::json!({"type": "Bearer", "accessToken": "a", "refreshToken": null}));
    }
}
