use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use identity_service::{
    build_router,
    config::{AppConfig, Environment},
    error::AppError,
    services::{
        AuthService, CodePolicy, GoogleOauthClient, PgCodeStore, PgIdentityStore,
        RedisSessionStore, SessionPolicy, SmtpEmailService,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Fail fast on invalid configuration
    let config = AppConfig::from_env()?;

    init_tracing(&config);

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = identity_service::db::create_pool(&config.database).await?;
    identity_service::db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;

    let session_policy = SessionPolicy::new(
        config.session.ttl_seconds,
        config.session.login_state_ttl_seconds,
    );
    let sessions = Arc::new(
        RedisSessionStore::new(&config.redis.url, session_policy)
            .await
            .map_err(AppError::InternalError)?,
    );
    tracing::info!("Session store initialized");

    let email = Arc::new(SmtpEmailService::new(&config.smtp)?);
    tracing::info!("Email service initialized");

    let google = Arc::new(GoogleOauthClient::new(config.google.clone()));

    let identity = Arc::new(PgIdentityStore::new(pool.clone()));
    let codes = Arc::new(PgCodeStore::new(
        pool,
        CodePolicy::new(
            config.verification.code_ttl_seconds,
            config.verification.resend_cooldown_seconds,
            config.verification.max_attempts,
        ),
    ));

    let auth_service = AuthService::new(
        identity.clone(),
        codes,
        sessions.clone(),
        email,
        google,
    )?;

    let state = AppState {
        config: config.clone(),
        identity,
        sessions,
        auth_service,
    };

    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    // JSON logs in prod for the aggregator, human-readable in dev.
    if config.environment == Environment::Prod {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
