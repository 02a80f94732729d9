//! Verification code store - issues, rate-limits, and validates the
//! short-lived numeric codes proving control of an email address.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::postgres::PgPool;
use std::sync::Mutex;

use crate::models::VerificationCode;
use crate::services::ServiceError;

const CODE_LENGTH: usize = 6;

/// Issue/validate policy knobs, fed from [`crate::config::VerificationConfig`].
#[derive(Debug, Clone)]
pub struct CodePolicy {
    pub ttl_seconds: i64,
    pub cooldown_seconds: i64,
    pub max_attempts: i32,
}

impl CodePolicy {
    pub fn new(ttl_seconds: i64, cooldown_seconds: i64, max_attempts: i32) -> Self {
        Self {
            ttl_seconds,
            cooldown_seconds,
            max_attempts,
        }
    }
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Generate and persist a fresh code for the email. Fails with
    /// `RateLimited` when a code was already issued within the cooldown
    /// window; the check-and-set is atomic per email.
    async fn issue(&self, email: &str) -> Result<VerificationCode, ServiceError>;

    /// Single-use validation: consumes the newest live code on match,
    /// counts failed attempts and kills the code past the attempt cap.
    /// Every failure mode surfaces as `InvalidOrExpiredCode`.
    async fn validate(&self, email: &str, code: &str) -> Result<(), ServiceError>;
}

/// Fixed-length random numeric code.
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| rng.gen_range(0..10).to_string())
        .collect()
}

// ==================== PostgreSQL implementation ====================

#[derive(Clone)]
pub struct PgCodeStore {
    pool: PgPool,
    policy: CodePolicy,
}

impl PgCodeStore {
    pub fn new(pool: PgPool, policy: CodePolicy) -> Self {
        Self { pool, policy }
    }
}

#[async_trait]
impl CodeStore for PgCodeStore {
    async fn issue(&self, email: &str) -> Result<VerificationCode, ServiceError> {
        let code = VerificationCode::new(
            email.to_string(),
            generate_code(),
            self.policy.ttl_seconds,
        );
        let cooldown_start = Utc::now() - Duration::seconds(self.policy.cooldown_seconds);

        // Per-email advisory lock makes the cooldown check-and-insert atomic;
        // two concurrent issues cannot both pass the window check.
        let mut tx = self.pool.begin().await.map_err(ServiceError::Database)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext(LOWER($1)))")
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(ServiceError::Database)?;

        let result = sqlx::query(
            r#"
            INSERT INTO verification_codes
                (code_id, email, code, created_at, expires_at, consumed, attempt_count)
            SELECT $1, $2, $3, $4, $5, FALSE, 0
            WHERE NOT EXISTS (
                SELECT 1 FROM verification_codes
                WHERE LOWER(email) = LOWER($2) AND created_at > $6
            )
            "#,
        )
        .bind(code.code_id)
        .bind(&code.email)
        .bind(&code.code)
        .bind(code.created_at)
        .bind(code.expires_at)
        .bind(cooldown_start)
        .execute(&mut *tx)
        .await
        .map_err(ServiceError::Database)?;

        tx.commit().await.map_err(ServiceError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::RateLimited {
                retry_after_seconds: self.policy.cooldown_seconds as u64,
            });
        }

        Ok(code)
    }

    async fn validate(&self, email: &str, candidate: &str) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await.map_err(ServiceError::Database)?;

        // Only the newest unconsumed, unexpired code is meaningful.
        let row = sqlx::query_as::<_, VerificationCode>(
            r#"
            SELECT * FROM verification_codes
            WHERE LOWER(email) = LOWER($1) AND consumed = FALSE AND expires_at > $2
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(email)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(ServiceError::Database)?;

        let Some(record) = row else {
            tx.rollback().await.ok();
            return Err(ServiceError::InvalidOrExpiredCode);
        };

        if record.attempt_count >= self.policy.max_attempts {
            tx.rollback().await.ok();
            return Err(ServiceError::InvalidOrExpiredCode);
        }

        if record.code != candidate {
            sqlx::query(
                "UPDATE verification_codes SET attempt_count = attempt_count + 1 WHERE code_id = $1",
            )
            .bind(record.code_id)
            .execute(&mut *tx)
            .await
            .map_err(ServiceError::Database)?;
            tx.commit().await.map_err(ServiceError::Database)?;
            return Err(ServiceError::InvalidOrExpiredCode);
        }

        sqlx::query("UPDATE verification_codes SET consumed = TRUE WHERE code_id = $1")
            .bind(record.code_id)
            .execute(&mut *tx)
            .await
            .map_err(ServiceError::Database)?;
        tx.commit().await.map_err(ServiceError::Database)?;

        Ok(())
    }
}

// ==================== In-memory implementation ====================

pub struct MemoryCodeStore {
    policy: CodePolicy,
    codes: Mutex<Vec<VerificationCode>>,
}

impl MemoryCodeStore {
    pub fn new(policy: CodePolicy) -> Self {
        Self {
            policy,
            codes: Mutex::new(Vec::new()),
        }
    }

    /// Latest issued code for an email; test hook.
    pub fn latest_code(&self, email: &str) -> Option<String> {
        self.codes
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .map(|c| c.code.clone())
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn issue(&self, email: &str) -> Result<VerificationCode, ServiceError> {
        let mut codes = lock(&self.codes)?;

        let cooldown_start = Utc::now() - Duration::seconds(self.policy.cooldown_seconds);
        let recently_issued = codes
            .iter()
            .any(|c| c.email.eq_ignore_ascii_case(email) && c.created_at > cooldown_start);

        if recently_issued {
            return Err(ServiceError::RateLimited {
                retry_after_seconds: self.policy.cooldown_seconds as u64,
            });
        }

        let code = VerificationCode::new(
            email.to_string(),
            generate_code(),
            self.policy.ttl_seconds,
        );
        codes.push(code.clone());
        Ok(code)
    }

    async fn validate(&self, email: &str, candidate: &str) -> Result<(), ServiceError> {
        let mut codes = lock(&self.codes)?;

        let record = codes
            .iter_mut()
            .rev()
            .find(|c| c.email.eq_ignore_ascii_case(email) && !c.consumed && !c.is_expired());

        let Some(record) = record else {
            return Err(ServiceError::InvalidOrExpiredCode);
        };

        if record.attempt_count >= self.policy.max_attempts {
            return Err(ServiceError::InvalidOrExpiredCode);
        }

        if record.code != candidate {
            record.attempt_count += 1;
            return Err(ServiceError::InvalidOrExpiredCode);
        }

        record.consumed = true;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, ServiceError> {
    mutex
        .lock()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Code store mutex poisoned: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CodePolicy {
        CodePolicy::new(300, 60, 5)
    }

    #[tokio::test]
    async fn issued_code_is_six_digits() {
        let store = MemoryCodeStore::new(policy());
        let code = store.issue("a@x.com").await.unwrap();
        assert_eq!(code.code.len(), 6);
        assert!(code.code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let store = MemoryCodeStore::new(policy());
        let issued = store.issue("a@x.com").await.unwrap();

        assert!(store.validate("a@x.com", &issued.code).await.is_ok());
        let err = store.validate("a@x.com", &issued.code).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
    }

    #[tokio::test]
    async fn expired_code_fails_validation() {
        let store = MemoryCodeStore::new(CodePolicy::new(-1, 0, 5));
        let issued = store.issue("a@x.com").await.unwrap();

        let err = store.validate("a@x.com", &issued.code).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
    }

    #[tokio::test]
    async fn reissue_within_cooldown_is_rate_limited() {
        let store = MemoryCodeStore::new(policy());

        assert!(store.issue("a@x.com").await.is_ok());
        let err = store.issue("a@x.com").await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited { .. }));

        // A different email is unaffected.
        assert!(store.issue("b@x.com").await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_issues_yield_one_success() {
        let store = std::sync::Arc::new(MemoryCodeStore::new(policy()));

        let a = store.clone();
        let b = store.clone();
        let (res_a, res_b) = tokio::join!(a.issue("race@x.com"), b.issue("race@x.com"));

        assert_ne!(res_a.is_ok(), res_b.is_ok());
    }

    #[tokio::test]
    async fn attempts_past_cap_kill_the_code() {
        let store = MemoryCodeStore::new(CodePolicy::new(300, 60, 3));
        let issued = store.issue("a@x.com").await.unwrap();
        let wrong = if issued.code == "000000" {
            "000001"
        } else {
            "000000"
        };

        for _ in 0..3 {
            assert!(store.validate("a@x.com", wrong).await.is_err());
        }

        // Correct code no longer accepted once the cap is hit.
        let err = store.validate("a@x.com", &issued.code).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
    }

    #[tokio::test]
    async fn newest_code_supersedes_older_ones() {
        let store = MemoryCodeStore::new(CodePolicy::new(300, 0, 5));
        let first = store.issue("a@x.com").await.unwrap();
        let second = store.issue("a@x.com").await.unwrap();

        // Older code no longer validates once superseded.
        if first.code != second.code {
            assert!(store.validate("a@x.com", &first.code).await.is_err());
        }
        assert!(store.validate("a@x.com", &second.code).await.is_ok());
    }
}
