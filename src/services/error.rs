use crate::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid or expired verification code")]
    InvalidOrExpiredCode,

    #[error("A verification code was recently sent; wait before requesting another")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Invalid or expired login state")]
    InvalidLoginState,

    #[error("Authentication provider error: {0}")]
    Provider(String),

    #[error("Email error: {0}")]
    Email(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Cache(e) => AppError::CacheError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::EmailTaken => {
                AppError::BadRequest(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::InvalidOrExpiredCode => {
                AppError::BadRequest(anyhow::anyhow!("Invalid or expired verification code"))
            }
            ServiceError::RateLimited {
                retry_after_seconds,
            } => AppError::TooManyRequests(
                "A verification code was recently sent; wait before requesting another"
                    .to_string(),
                Some(retry_after_seconds),
            ),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Not authenticated"))
            }
            ServiceError::InvalidLoginState => {
                AppError::BadRequest(anyhow::anyhow!("Invalid or expired login state"))
            }
            // Provider-communication detail stays in the logs.
            ServiceError::Provider(e) => AppError::InternalError(anyhow::anyhow!(e)),
            ServiceError::Email(e) => AppError::EmailError(e),
        }
    }
}
