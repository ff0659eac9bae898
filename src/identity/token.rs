//! Signed token issuance and validation (HS256).
//!
//! Access and refresh tokens are signed with two independent keys. Validation never
//! surfaces an error to the caller: every failure is logged with its category and
//! collapses to `false`.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::AuthError;
use super::principal::{Principal, Role};
use crate::users::User;

pub const DEFAULT_ACCESS_TTL_SECS: i64 = 5 * 60;
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Access,
    Refresh,
}

impl Display for KeyClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyClass::Access => f.write_str("access"),
            KeyClass::Refresh => f.write_str("refresh"),
        }
    }
}

/// Symmetric HMAC secret. Debug output never shows the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl SigningKey {
    /// HS256 needs at least 256 bits of key material.
    pub const MIN_LEN: usize = 32;

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, AuthError> {
        let bytes = bytes.into();
        if bytes.len() < Self::MIN_LEN {
            return Err(AuthError::InvalidKey(format!(
                "key is {} bytes, at least {} required",
                bytes.len(),
                Self::MIN_LEN
            )));
        }
        Ok(Self { bytes })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, AuthError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::InvalidKey(format!("not valid base64: {}", e)))?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<{} bytes>)", self.bytes.len())
    }
}

/// Decoded token payload. Access tokens carry `id` and `roles`; refresh tokens carry `jti`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn role_set(&self) -> BTreeSet<Role> {
        self.roles.iter().flatten().copied().collect()
    }

    /// Build an authenticated principal from access-token claims.
    pub fn to_principal(&self) -> Result<Principal, AuthError> {
        let user_id = self.id.ok_or(AuthError::InvalidAccessToken)?;
        Ok(Principal {
            user_id,
            username: self.sub.clone(),
            roles: self.role_set(),
            authenticated: true,
        })
    }
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn new(key: &SigningKey) -> Self {
        Self {
            encoding: EncodingKey::from_secret(key.as_bytes()),
            decoding: DecodingKey::from_secret(key.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(
        access_key: &SigningKey,
        refresh_key: &SigningKey,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, AuthError> {
        if access_key == refresh_key {
            return Err(AuthError::InvalidKey("access and refresh keys must differ".into()));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Ok(Self {
            access: KeyPair::new(access_key),
            refresh: KeyPair::new(refresh_key),
            access_ttl,
            refresh_ttl,
            validation,
        })
    }

    fn keys(&self, class: KeyClass) -> &KeyPair {
        match class {
            KeyClass::Access => &self.access,
            KeyClass::Refresh => &self.refresh,
        }
    }

    fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<i64, AuthError> {
        now.checked_add_signed(ttl)
            .map(|t| t.timestamp())
            .ok_or_else(|| AuthError::TokenIssue("token lifetime overflows the clock".into()))
    }

    fn sign(&self, claims: &Claims, class: KeyClass) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.keys(class).encoding)
            .map_err(|e| AuthError::TokenIssue(e.to_string()))
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.username.clone(),
            id: Some(user.id),
            roles: Some(user.roles.iter().copied().collect()),
            jti: None,
            iat: now.timestamp(),
            exp: Self::expiry(now, self.access_ttl)?,
        };
        let token = self.sign(&claims, KeyClass::Access)?;
        debug!(target: "auth.token", user = %user.username, exp = claims.exp, "issued access token");
        Ok(token)
    }

    pub fn issue_refresh_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.username.clone(),
            id: None,
            roles: None,
            jti: Some(uuid::Uuid::new_v4().to_string()),
            iat: now.timestamp(),
            exp: Self::expiry(now, self.refresh_ttl)?,
        };
        let token = self.sign(&claims, KeyClass::Refresh)?;
        debug!(target: "auth.token", user = %user.username, exp = claims.exp, "issued refresh token");
        Ok(token)
    }

    pub fn validate(&self, token: &str, class: KeyClass) -> bool {
        match decode::<Claims>(token, &self.keys(class).decoding, &self.validation) {
            Ok(_) => true,
            Err(err) => {
                warn!(target: "auth.token", key = %class, reason = failure_reason(err.kind()), "token rejected: {}", err);
                false
            }
        }
    }

    /// Decode a token already accepted by [`TokenCodec::validate`].
    pub fn claims(&self, token: &str, class: KeyClass) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.keys(class).decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| match class {
                KeyClass::Access => AuthError::InvalidAccessToken,
                KeyClass::Refresh => AuthError::InvalidRefreshToken,
            })
    }
}

fn failure_reason(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ExpiredSignature => "expired",
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => "malformed",
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName | ErrorKind::MissingAlgorithm => "unsupported_algorithm",
        ErrorKind::InvalidSignature => "bad_signature",
        ErrorKind::MissingRequiredClaim(_) => "missing_claim",
        _ => "invalid",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_codec() -> TokenCodec {
        codec_with_ttls(Duration::seconds(DEFAULT_ACCESS_TTL_SECS), Duration::seconds(DEFAULT_REFRESH_TTL_SECS))
    }

    pub(crate) fn codec_with_ttls(access: Duration, refresh: Duration) -> TokenCodec {
        let ak = SigningKey::from_bytes(vec![7u8; 32]).unwrap();
        let rk = SigningKey::from_bytes(vec![9u8; 32]).unwrap();
        TokenCodec::new(&ak, &rk, access, refresh).unwrap()
    }

    fn alice() -> User {
        User {
            id: 42,
            username: "alice".into(),
            password_hash: String::new(),
            roles: [Role::User, Role::Admin].into_iter().collect(),
            files: Default::default(),
        }
    }

    #[test]
    fn access_token_round_trips_identity() {
        let codec = test_codec();
        let token = codec.issue_access_token(&alice()).unwrap();
        assert!(codec.validate(&token, KeyClass::Access));
        let claims = codec.claims(&token, KeyClass::Access).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.id, Some(42));
        assert_eq!(claims.role_set(), alice().roles);
        assert_eq!(claims.exp - claims.iat, DEFAULT_ACCESS_TTL_SECS);
    }

    #[test]
    fn refresh_token_uses_refresh_key_only() {
        let codec = test_codec();
        let token = codec.issue_refresh_token(&alice()).unwrap();
        assert!(codec.validate(&token, KeyClass::Refresh));
        assert!(!codec.validate(&token, KeyClass::Access));
        let claims = codec.claims(&token, KeyClass::Refresh).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.id.is_none());
        assert!(claims.roles.is_none());
    }

    #[test]
    fn refresh_tokens_are_unique() {
        let codec = test_codec();
        let a = codec.issue_refresh_token(&alice()).unwrap();
        let b = codec.issue_refresh_token(&alice()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let codec = codec_with_ttls(Duration::seconds(-30), Duration::seconds(-30));
        let at = codec.issue_access_token(&alice()).unwrap();
        let rt = codec.issue_refresh_token(&alice()).unwrap();
        assert!(!codec.validate(&at, KeyClass::Access));
        assert!(!codec.validate(&rt, KeyClass::Refresh));
    }

    #[test]
    fn foreign_key_is_rejected() {
        let codec = test_codec();
        let other = TokenCodec::new(
            &SigningKey::from_bytes(vec![1u8; 32]).unwrap(),
            &SigningKey::from_bytes(vec![2u8; 32]).unwrap(),
            Duration::seconds(60),
            Duration::seconds(60),
        )
        .unwrap();
        let token = other.issue_access_token(&alice()).unwrap();
        assert!(!codec.validate(&token, KeyClass::Access));
    }

    #[test]
    fn garbage_is_rejected_without_panicking() {
        let codec = test_codec();
        for t in ["", "abc", "a.b.c", "eyJhbGciOiJub25lIn0.e30."] {
            assert!(!codec.validate(t, KeyClass::Access));
        }
        assert_eq!(codec.claims("abc", KeyClass::Refresh), Err(AuthError::InvalidRefreshToken));
    }

    #[test]
    fn key_constraints() {
        assert!(SigningKey::from_bytes(vec![0u8; 16]).is_err());
        assert!(SigningKey::from_base64("!!notbase64").is_err());
        let encoded = base64::engine::general_purpose::STANDARD.encode([5u8; 48]);
        assert_eq!(SigningKey::from_base64(&encoded).unwrap().as_bytes().len(), 48);
        let same = SigningKey::from_bytes(vec![3u8; 32]).unwrap();
        assert!(TokenCodec::new(&same, &same, Duration::seconds(1), Duration::seconds(1)).is_err());
    }

    #[test]
    fn oversized_lifetime_is_an_error_not_a_panic() {
        let codec = codec_with_ttls(Duration::MAX, Duration::MAX);
        assert!(matches!(codec.issue_access_token(&alice()), Err(AuthError::TokenIssue(_))));
        assert!(matches!(codec.issue_refresh_token(&alice()), Err(AuthError::TokenIssue(_))));
    }

    #[test]
    fn principal_from_access_claims() {
        let codec = test_codec();
        let token = codec.issue_access_token(&alice()).unwrap();
        let p = codec.claims(&token, KeyClass::Access).unwrap().to_principal().unwrap();
        assert!(p.authenticated);
        assert_eq!(p.user_id, 42);
        assert!(p.has_role(Role::Admin));
    }
}
