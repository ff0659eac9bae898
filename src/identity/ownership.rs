use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::users::User;

/// Fails with NotFound when `filename` is not in the user's file set. A non-owner gets
/// the same answer as for a file that does not exist.
pub fn assert_owns(user: &User, filename: &str) -> AppResult<()> {
    if user.files.contains(filename) {
        return Ok(());
    }
    warn!(target: "auth.ownership", user = %user.username, file = filename, "file access denied");
    Err(AppError::not_found("file_not_found".to_string(), format!("File not found: {}", filename)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    #[test]
    fn owner_passes_and_stranger_gets_not_found() {
        let user = User {
            id: 1,
            username: "alice".into(),
            password_hash: String::new(),
            roles: [Role::User].into_iter().collect(),
            files: ["a.txt".to_string()].into_iter().collect(),
        };
        assert!(assert_owns(&user, "a.txt").is_ok());
        let err = assert_owns(&user, "b.txt").unwrap_err();
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code_str(), "file_not_found");
    }
}
