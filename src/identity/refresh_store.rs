use std::collections::HashMap;

use parking_lot::Mutex;

/// Latest refresh token per username. Issuing a new token for a user overwrites the
/// previous one, so only the most recent token is ever honored.
///
/// In-memory only; tokens do not survive a restart.
#[derive(Debug, Default)]
pub struct RefreshTokenStore {
    tokens: Mutex<HashMap<String, String>>,
}

impl RefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, username: &str, token: &str) {
        self.tokens.lock().insert(username.to_string(), token.to_string());
    }

    pub fn get(&self, username: &str) -> Option<String> {
        self.tokens.lock().get(username).cloned()
    }

    /// Returns true when a token was present.
    pub fn remove(&self, username: &str) -> bool {
        self.tokens.lock().remove(username).is_some()
    }

    /// True when `token` is the value currently stored for `username`.
    pub fn is_current(&self, username: &str, token: &str) -> bool {
        self.tokens.lock().get(username).map(|t| t == token).unwrap_or(false)
    }

    /// Compare-and-swap: store `replacement` only if `expected` is still current.
    pub fn replace_if_current(&self, username: &str, expected: &str, replacement: &str) -> bool {
        let mut map = self.tokens.lock();
        match map.get_mut(username) {
            Some(cur) if cur == expected => {
                *cur = replacement.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
