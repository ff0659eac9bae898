//! Identity core: token issuance and validation, refresh-token rotation, the
//! per-request security context and the ownership check used by file operations.
//! Keep the public surface thin and split implementation across sub-modules.

mod error;
mod principal;
mod token;
mod refresh_store;
mod request_context;
mod password;
mod session;
mod ownership;
pub mod middleware;

pub use error::AuthError;
pub use principal::{Principal, Role};
pub use token::{Claims, KeyClass, SigningKey, TokenCodec, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};
pub use refresh_store::RefreshTokenStore;
pub use request_context::{AdminOnly, AuthState, Authenticated, RequestContext};
pub use password::{Argon2PasswordEncoder, PasswordEncoder};
pub use session::{AuthSessionService, LoginRequest, RefreshRequest, TokenResponse};
pub use ownership::assert_owns;
