//! Identity store - durable user records and the merge decision.
//!
//! Owns the one-account-per-email invariant. The Postgres implementation
//! leans on partial unique indexes as the source of truth for races; the
//! in-memory implementation serializes everything behind one mutex and is
//! used by the test suites.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::User;
use crate::services::ServiceError;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Atomic check-and-insert: concurrent attempts for the same email yield
    /// exactly one success, the loser gets `EmailTaken`.
    async fn create_with_password(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<User, ServiceError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    /// Resolve a Google identity to a user, merging onto an existing email
    /// match or creating a fresh google-only account. Never duplicates.
    async fn resolve_or_merge_google(
        &self,
        google_id: &str,
        email: &str,
        avatar_url: Option<&str>,
    ) -> Result<User, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

// ==================== PostgreSQL implementation ====================

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach the Google identity to an existing user matched by email.
    /// Returns None when no user has that email.
    async fn merge_onto_email(
        &self,
        google_id: &str,
        email: &str,
        avatar_url: Option<&str>,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET google_id = $1, avatar_url = COALESCE($2, avatar_url)
            WHERE LOWER(email) = LOWER($3)
            RETURNING *
            "#,
        )
        .bind(google_id)
        .bind(avatar_url)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create_with_password(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<User, ServiceError> {
        let user = User::with_password(email.to_string(), password_hash.to_string());

        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, password_hash, google_id, avatar_url, created_at)
            VALUES ($1, $2, $3, NULL, NULL, $4)
            RETURNING *
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            // A race loser hits the unique index; indistinguishable from a
            // pre-check failure for the caller.
            Err(e) if is_unique_violation(&e) => Err(ServiceError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn resolve_or_merge_google(
        &self,
        google_id: &str,
        email: &str,
        avatar_url: Option<&str>,
    ) -> Result<User, ServiceError> {
        // 1. Repeat login for a known Google identity: refresh the avatar.
        let existing = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET avatar_url = COALESCE($1, avatar_url)
            WHERE google_id = $2
            RETURNING *
            "#,
        )
        .bind(avatar_url)
        .bind(google_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user) = existing {
            return Ok(user);
        }

        // 2. Silent merge onto an existing account with the same email; any
        // password credential stays untouched.
        if let Some(user) = self.merge_onto_email(google_id, email, avatar_url).await? {
            return Ok(user);
        }

        // 3. Unseen email: create a google-only user. A concurrent callback
        // that wins the insert race trips the unique index, in which case the
        // merge path is retried against the winner's row.
        let user = User::with_google(
            email.to_string(),
            google_id.to_string(),
            avatar_url.map(String::from),
        );

        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, password_hash, google_id, avatar_url, created_at)
            VALUES ($1, $2, NULL, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.google_id)
        .bind(&user.avatar_url)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => self
                .merge_onto_email(google_id, email, avatar_url)
                .await?
                .ok_or_else(|| {
                    ServiceError::Internal(anyhow::anyhow!(
                        "User insert conflicted but no row found for merge"
                    ))
                }),
            Err(e) => Err(e.into()),
        }
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

// ==================== In-memory implementation ====================

/// Mutex-serialized map store. The single lock gives the per-email
/// serialization guarantee directly, which makes it the reference
/// implementation for the merge semantics in tests.
#[derive(Default)]
pub struct MemoryIdentityStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_with_password(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<User, ServiceError> {
        let mut users = lock(&self.users)?;

        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email))
        {
            return Err(ServiceError::EmailTaken);
        }

        let user = User::with_password(email.to_string(), password_hash.to_string());
        users.insert(user.user_id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let users = lock(&self.users)?;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let users = lock(&self.users)?;
        Ok(users.get(&user_id).cloned())
    }

    async fn resolve_or_merge_google(
        &self,
        google_id: &str,
        email: &str,
        avatar_url: Option<&str>,
    ) -> Result<User, ServiceError> {
        let mut users = lock(&self.users)?;

        // Repeat login for a known Google identity.
        if let Some(user) = users
            .values_mut()
            .find(|u| u.google_id.as_deref() == Some(google_id))
        {
            if let Some(avatar) = avatar_url {
                user.avatar_url = Some(avatar.to_string());
            }
            return Ok(user.clone());
        }

        // Silent merge onto an existing email match.
        if let Some(user) = users
            .values_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email))
        {
            user.google_id = Some(google_id.to_string());
            if let Some(avatar) = avatar_url {
                user.avatar_url = Some(avatar.to_string());
            }
            return Ok(user.clone());
        }

        let user = User::with_google(
            email.to_string(),
            google_id.to_string(),
            avatar_url.map(String::from),
        );
        users.insert(user.user_id, user.clone());
        Ok(user)
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, ServiceError> {
    mutex
        .lock()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Identity store mutex poisoned: {}", e)))
}
