//! Session store - opaque session tokens and the single-use OAuth login
//! state, both TTL-bound.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::Session;
use crate::services::ServiceError;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Bind a fresh unguessable token to the user with a fixed-window expiry.
    async fn issue(&self, user_id: Uuid) -> Result<String, ServiceError>;

    /// Resolve a token to its user. Absent and expired are indistinguishable.
    async fn validate(&self, token: &str) -> Result<Option<Uuid>, ServiceError>;

    /// Idempotent removal; revoking an unknown token is a no-op.
    async fn revoke(&self, token: &str) -> Result<(), ServiceError>;

    /// Anti-forgery state for the OAuth redirect: single-use, short-lived.
    async fn issue_login_state(&self) -> Result<String, ServiceError>;

    /// Consume-and-validate the state parameter; true exactly once per token.
    async fn consume_login_state(&self, state: &str) -> Result<bool, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

/// 32 bytes of OS randomness, hex-encoded. Collision probability is
/// negligible; treated as a system invariant.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub session_ttl_seconds: i64,
    pub login_state_ttl_seconds: i64,
}

impl SessionPolicy {
    pub fn new(session_ttl_seconds: i64, login_state_ttl_seconds: i64) -> Self {
        Self {
            session_ttl_seconds,
            login_state_ttl_seconds,
        }
    }
}

// ==================== Redis implementation ====================

#[derive(Clone)]
pub struct RedisSessionStore {
    _client: Client,
    manager: ConnectionManager,
    policy: SessionPolicy,
}

impl RedisSessionStore {
    pub async fn new(url: &str, policy: SessionPolicy) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url)?;

        // ConnectionManager reconnects automatically.
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
            policy,
        })
    }

    fn session_key(token: &str) -> String {
        format!("session:{}", token)
    }

    fn state_key(state: &str) -> String {
        format!("oauth_state:{}", state)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn issue(&self, user_id: Uuid) -> Result<String, ServiceError> {
        let token = generate_token();
        let mut conn = self.manager.clone();

        redis::cmd("SET")
            .arg(Self::session_key(&token))
            .arg(user_id.to_string())
            .arg("EX")
            .arg(self.policy.session_ttl_seconds)
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(token)
    }

    async fn validate(&self, token: &str) -> Result<Option<Uuid>, ServiceError> {
        let mut conn = self.manager.clone();

        let value: Option<String> = redis::cmd("GET")
            .arg(Self::session_key(token))
            .query_async(&mut conn)
            .await?;

        // An unparsable value means a corrupt entry; treat as absent.
        Ok(value.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    async fn revoke(&self, token: &str) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();

        redis::cmd("DEL")
            .arg(Self::session_key(token))
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn issue_login_state(&self) -> Result<String, ServiceError> {
        let state = generate_token();
        let mut conn = self.manager.clone();

        redis::cmd("SET")
            .arg(Self::state_key(&state))
            .arg("1")
            .arg("EX")
            .arg(self.policy.login_state_ttl_seconds)
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(state)
    }

    async fn consume_login_state(&self, state: &str) -> Result<bool, ServiceError> {
        let mut conn = self.manager.clone();

        // GETDEL makes consumption atomic: concurrent callbacks with the
        // same state see at most one success.
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(Self::state_key(state))
            .query_async(&mut conn)
            .await?;

        Ok(value.is_some())
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }
}

// ==================== In-memory implementation ====================

pub struct MemorySessionStore {
    policy: SessionPolicy,
    sessions: Mutex<HashMap<String, Session>>,
    login_states: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemorySessionStore {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            sessions: Mutex::new(HashMap::new()),
            login_states: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn issue(&self, user_id: Uuid) -> Result<String, ServiceError> {
        let token = generate_token();
        let session = Session::new(token.clone(), user_id, self.policy.session_ttl_seconds);
        lock(&self.sessions)?.insert(token.clone(), session);
        Ok(token)
    }

    async fn validate(&self, token: &str) -> Result<Option<Uuid>, ServiceError> {
        let sessions = lock(&self.sessions)?;
        Ok(sessions
            .get(token)
            .filter(|s| !s.is_expired())
            .map(|s| s.user_id))
    }

    async fn revoke(&self, token: &str) -> Result<(), ServiceError> {
        lock(&self.sessions)?.remove(token);
        Ok(())
    }

    async fn issue_login_state(&self) -> Result<String, ServiceError> {
        let state = generate_token();
        let expires_at = Utc::now() + Duration::seconds(self.policy.login_state_ttl_seconds);
        lock(&self.login_states)?.insert(state.clone(), expires_at);
        Ok(state)
    }

    async fn consume_login_state(&self, state: &str) -> Result<bool, ServiceError> {
        let mut states = lock(&self.login_states)?;
        match states.remove(state) {
            Some(expires_at) => Ok(Utc::now() <= expires_at),
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, ServiceError> {
    mutex
        .lock()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Session store mutex poisoned: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemorySessionStore {
        MemorySessionStore::new(SessionPolicy::new(3600, 300))
    }

    #[tokio::test]
    async fn issued_token_validates_until_revoked() {
        let store = store();
        let user_id = Uuid::new_v4();

        let token = store.issue(user_id).await.unwrap();
        assert_eq!(store.validate(&token).await.unwrap(), Some(user_id));

        store.revoke(&token).await.unwrap();
        assert_eq!(store.validate(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = store();
        let token = store.issue(Uuid::new_v4()).await.unwrap();

        store.revoke(&token).await.unwrap();
        // Second revoke of an already-invalid token is a no-op.
        assert!(store.revoke(&token).await.is_ok());
        assert!(store.revoke("never-issued").await.is_ok());
    }

    #[tokio::test]
    async fn expired_session_is_indistinguishable_from_absent() {
        let store = MemorySessionStore::new(SessionPolicy::new(-1, 300));
        let token = store.issue(Uuid::new_v4()).await.unwrap();

        assert_eq!(store.validate(&token).await.unwrap(), None);
        assert_eq!(store.validate("never-issued").await.unwrap(), None);
    }

    #[tokio::test]
    async fn tokens_are_unique_and_opaque() {
        let store = store();
        let t1 = store.issue(Uuid::new_v4()).await.unwrap();
        let t2 = store.issue(Uuid::new_v4()).await.unwrap();

        assert_ne!(t1, t2);
        assert_eq!(t1.len(), 64);
    }

    #[tokio::test]
    async fn login_state_is_single_use() {
        let store = store();
        let state = store.issue_login_state().await.unwrap();

        assert!(store.consume_login_state(&state).await.unwrap());
        assert!(!store.consume_login_state(&state).await.unwrap());
        assert!(!store.consume_login_state("forged").await.unwrap());
    }

    #[tokio::test]
    async fn expired_login_state_is_rejected() {
        let store = MemorySessionStore::new(SessionPolicy::new(3600, -1));
        let state = store.issue_login_state().await.unwrap();

        assert!(!store.consume_login_state(&state).await.unwrap());
    }
}
