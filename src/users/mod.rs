//! User records and the user service.
//!
//! The repository trait is the seam towards persistence; `InMemoryUserRepository`
//! is the in-process implementation the server runs with.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::identity::{PasswordEncoder, Principal, Role};

pub const USERNAME_MIN: usize = 4;
pub const USERNAME_MAX: usize = 20;
pub const PASSWORD_MIN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub roles: BTreeSet<Role>,
    pub files: BTreeSet<String>,
}

/// Public view of a user; never includes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserResponse {
    pub username: String,
    pub roles: BTreeSet<Role>,
    pub files: BTreeSet<String>,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self { username: u.username.clone(), roles: u.roles.clone(), files: u.files.clone() }
    }
}

pub trait UserRepository: Send + Sync {
    fn find_by_username(&self, username: &str) -> Option<User>;
    fn find_by_id(&self, id: i64) -> Option<User>;
    /// Fails with Conflict when the username is taken.
    fn insert(&self, username: &str, password_hash: &str, roles: BTreeSet<Role>) -> AppResult<User>;
    fn add_file(&self, id: i64, filename: &str) -> AppResult<User>;
    fn remove_file(&self, id: i64, filename: &str) -> AppResult<User>;
}

#[derive(Debug, Default)]
struct UserTable {
    next_id: i64,
    by_id: HashMap<i64, User>,
    by_name: HashMap<String, i64>,
}

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    inner: RwLock<UserTable>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, id: i64, f: F) -> AppResult<User>
    where
        F: FnOnce(&mut User),
    {
        let mut t = self.inner.write();
        let user = t.by_id.get_mut(&id).ok_or_else(|| user_not_found_id(id))?;
        f(user);
        Ok(user.clone())
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_username(&self, username: &str) -> Option<User> {
        let t = self.inner.read();
        t.by_name.get(username).and_then(|id| t.by_id.get(id)).cloned()
    }

    fn find_by_id(&self, id: i64) -> Option<User> {
        self.inner.read().by_id.get(&id).cloned()
    }

    fn insert(&self, username: &str, password_hash: &str, roles: BTreeSet<Role>) -> AppResult<User> {
        let mut t = self.inner.write();
        if t.by_name.contains_key(username) {
            return Err(AppError::conflict("username_taken".to_string(), format!("Username {} is already taken", username)));
        }
        t.next_id += 1;
        let user = User {
            id: t.next_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            roles,
            files: BTreeSet::new(),
        };
        t.by_name.insert(user.username.clone(), user.id);
        t.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    fn add_file(&self, id: i64, filename: &str) -> AppResult<User> {
        self.update(id, |u| { u.files.insert(filename.to_string()); })
    }

    fn remove_file(&self, id: i64, filename: &str) -> AppResult<User> {
        self.update(id, |u| { u.files.remove(filename); })
    }
}

fn user_not_found_id(id: i64) -> AppError {
    AppError::not_found("user_not_found".to_string(), format!("User with id {} not found", id))
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    encoder: Arc<dyn PasswordEncoder>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, encoder: Arc<dyn PasswordEncoder>) -> Self {
        Self { repo, encoder }
    }

    pub fn repository(&self) -> &Arc<dyn UserRepository> {
        &self.repo
    }

    pub fn encoder(&self) -> &Arc<dyn PasswordEncoder> {
        &self.encoder
    }

    /// Register a regular user. Roles are always `{USER}`.
    pub fn register(&self, username: &str, password: &str) -> AppResult<UserResponse> {
        let username = username.trim();
        let len = username.chars().count();
        if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
            return Err(AppError::user(
                "invalid_username".to_string(),
                format!("Username length must be between {} and {} characters.", USERNAME_MIN, USERNAME_MAX),
            ));
        }
        if password.chars().count() < PASSWORD_MIN {
            return Err(AppError::user(
                "invalid_password".to_string(),
                format!("Password length must be minimum {} characters.", PASSWORD_MIN),
            ));
        }
        let hash = self.encoder.hash(password)?;
        let user = self.repo.insert(username, &hash, [Role::User].into_iter().collect())?;
        info!(target: "users", user = %user.username, id = user.id, "registered user");
        Ok(UserResponse::from(&user))
    }

    /// Create the bootstrap administrator if it does not exist yet.
    pub fn ensure_admin(&self, username: &str, password: &str) -> AppResult<User> {
        if let Some(existing) = self.repo.find_by_username(username) {
            return Ok(existing);
        }
        let hash = self.encoder.hash(password)?;
        let user = self.repo.insert(username, &hash, [Role::User, Role::Admin].into_iter().collect())?;
        info!(target: "users", user = %user.username, "created bootstrap admin");
        Ok(user)
    }

    pub fn get_by_username(&self, username: &str) -> AppResult<User> {
        self.repo.find_by_username(username).ok_or_else(|| {
            AppError::not_found("user_not_found".to_string(), format!("User with username {} not found", username))
        })
    }

    pub fn get_by_id(&self, id: i64) -> AppResult<User> {
        self.repo.find_by_id(id).ok_or_else(|| user_not_found_id(id))
    }

    pub fn find_by_id(&self, id: i64) -> AppResult<UserResponse> {
        self.get_by_id(id).map(|u| UserResponse::from(&u))
    }

    pub fn my_profile(&self, principal: &Principal) -> AppResult<UserResponse> {
        self.find_by_id(principal.user_id)
    }

    pub fn add_file(&self, id: i64, filename: &str) -> AppResult<User> {
        self.repo.add_file(id, filename)
    }

    pub fn remove_file(&self, id: i64, filename: &str) -> AppResult<User> {
        self.repo.remove_file(id, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Argon2PasswordEncoder;

    fn service() -> UserService {
        UserService::new(Arc::new(InMemoryUserRepository::new()), Arc::new(Argon2PasswordEncoder))
    }

    #[test]
    fn register_assigns_user_role_and_hashes() {
        let svc = service();
        let resp = svc.register("alice", "pw12").unwrap();
        assert_eq!(resp.roles, [Role::User].into_iter().collect());
        let stored = svc.get_by_username("alice").unwrap();
        assert_ne!(stored.password_hash, "pw12");
        assert!(svc.encoder().verify("pw12", &stored.password_hash));
    }

    #[test]
    fn register_validates_lengths_and_uniqueness() {
        let svc = service();
        assert_eq!(svc.register("abc", "pw12").unwrap_err().http_status(), 400);
        assert_eq!(svc.register("abcdefghijklmnopqrstu", "pw12").unwrap_err().http_status(), 400);
        assert_eq!(svc.register("alice", "pw").unwrap_err().http_status(), 400);
        svc.register("alice", "pw12").unwrap();
        assert_eq!(svc.register("alice", "other").unwrap_err().http_status(), 409);
    }

    #[test]
    fn ids_are_sequential_and_lookup_works() {
        let svc = service();
        svc.register("first", "pass").unwrap();
        svc.register("second", "pass").unwrap();
        assert_eq!(svc.get_by_username("second").unwrap().id, 2);
        assert_eq!(svc.find_by_id(1).unwrap().username, "first");
        assert_eq!(svc.get_by_id(99).unwrap_err().http_status(), 404);
    }

    #[test]
    fn file_membership_updates() {
        let svc = service();
        svc.register("carol", "pass").unwrap();
        let id = svc.get_by_username("carol").unwrap().id;
        svc.add_file(id, "a.txt").unwrap();
        let u = svc.add_file(id, "b.txt").unwrap();
        assert_eq!(u.files.len(), 2);
        let u = svc.remove_file(id, "a.txt").unwrap();
        assert!(!u.files.contains("a.txt"));
        assert_eq!(svc.add_file(404, "x").unwrap_err().http_status(), 404);
    }

    #[test]
    fn ensure_admin_is_idempotent() {
        let svc = service();
        let a = svc.ensure_admin("root", "rootpw").unwrap();
        let b = svc.ensure_admin("root", "different").unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.roles.contains(&Role::Admin));
    }
}
