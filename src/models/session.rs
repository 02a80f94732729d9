//! Session model - opaque server-side session bindings.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// A session binds an opaque token to a user with a fixed-window expiry.
///
/// The token carries no decodable structure; validity is purely membership
/// in the session store plus `now < expires_at`.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, user_id: Uuid, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            token,
            user_id,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
