//! Verification code model - short-lived numeric email codes.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Email verification code.
///
/// Single-use: consumed on first successful validation. A bounded number of
/// failed attempts invalidates the code early. Superseded codes stay in
/// storage until expiry for audit.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationCode {
    pub code_id: Uuid,
    pub email: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub attempt_count: i32,
}

impl VerificationCode {
    pub fn new(email: String, code: String, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            code_id: Uuid::new_v4(),
            email,
            code,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            consumed: false,
            attempt_count: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_code_is_not_expired() {
        let code = VerificationCode::new("a@x.com".to_string(), "123456".to_string(), 300);
        assert!(!code.is_expired());
        assert!(!code.consumed);
        assert_eq!(code.attempt_count, 0);
    }

    #[test]
    fn zero_ttl_code_expires_immediately() {
        let code = VerificationCode::new("a@x.com".to_string(), "123456".to_string(), -1);
        assert!(code.is_expired());
    }
}
