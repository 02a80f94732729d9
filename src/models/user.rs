//! User model - one account per email, regardless of authentication method.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity.
///
/// `password_hash` and `google_id` are independently optional but at least
/// one is always present; a user holds both after a merge. Uniqueness on
/// `email` and `google_id` applies only among present values.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a user from the password registration path.
    pub fn with_password(email: String, password_hash: String) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash: Some(password_hash),
            google_id: None,
            avatar_url: None,
            created_at: Utc::now(),
        }
    }

    /// Create a user from the first Google callback for an unseen email.
    pub fn with_google(email: String, google_id: String, avatar_url: Option<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash: None,
            google_id: Some(google_id),
            avatar_url,
            created_at: Utc::now(),
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_user_has_no_google_identity() {
        let user = User::with_password("a@x.com".to_string(), "$argon2id$...".to_string());
        assert!(user.has_password());
        assert!(user.google_id.is_none());
    }

    #[test]
    fn google_user_has_no_password() {
        let user = User::with_google(
            "a@x.com".to_string(),
            "google-123".to_string(),
            Some("https://lh3.example/avatar".to_string()),
        );
        assert!(!user.has_password());
        assert_eq!(user.google_id.as_deref(), Some("google-123"));
    }
}
