use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use identity_service::{
    build_router,
    config::{
        AppConfig, CookieConfig, DatabaseConfig, Environment, GoogleOAuthConfig, RedisConfig,
        SecurityConfig, SessionConfig, SmtpConfig, VerificationConfig,
    },
    services::{
        AuthService, CodePolicy, MemoryCodeStore, MemoryIdentityStore, MemorySessionStore,
        MockEmailService, MockGoogleAuth, SessionPolicy,
    },
    AppState,
};

fn test_config() -> AppConfig {
    AppConfig {
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        log_level: "error".to_string(),
        port: 0,
        frontend_url: "https://app.example.test".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        google: GoogleOAuthConfig {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_uri: "https://api.example.test/api/auth/google/callback".to_string(),
        },
        smtp: SmtpConfig {
            user: "noreply@example.test".to_string(),
            app_password: "unused".to_string(),
        },
        cookie: CookieConfig {
            name: "session_id".to_string(),
            domain: ".example.test".to_string(),
            secure: false,
        },
        security: SecurityConfig {
            allowed_origins: vec!["https://app.example.test".to_string()],
        },
        verification: VerificationConfig {
            code_ttl_seconds: 300,
            resend_cooldown_seconds: 60,
            max_attempts: 5,
        },
        session: SessionConfig {
            ttl_seconds: 604_800,
            login_state_ttl_seconds: 300,
        },
    }
}

struct TestApp {
    app: Router,
    email: Arc<MockEmailService>,
}

fn setup_with_codes(code_policy: CodePolicy) -> TestApp {
    let config = test_config();

    let identity = Arc::new(MemoryIdentityStore::new());
    let codes = Arc::new(MemoryCodeStore::new(code_policy));
    let sessions = Arc::new(MemorySessionStore::new(SessionPolicy::new(
        config.session.ttl_seconds,
        config.session.login_state_ttl_seconds,
    )));
    let email = Arc::new(MockEmailService::new());
    let google = Arc::new(MockGoogleAuth::new(
        "google-oauth-1",
        "merge@x.com",
        Some("https://lh3.example/avatar"),
    ));

    let auth_service = AuthService::new(
        identity.clone(),
        codes,
        sessions.clone(),
        email.clone(),
        google,
    )
    .expect("auth service");

    let state = AppState {
        config,
        identity,
        sessions,
        auth_service,
    };

    let app = build_router(state).expect("router");
    TestApp { app, email }
}

fn setup() -> TestApp {
    // No resend cooldown so tests can request codes freely.
    setup_with_codes(CodePolicy::new(300, 0, 5))
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn session_cookie_pair(response: &axum::response::Response) -> Option<String> {
    let cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    cookie.split(';').next().map(str::to_string)
}

/// Drive send-code then register, returning the session cookie pair.
async fn register(app: &TestApp, email: &str, password: &str) -> String {
    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/send-code",
            serde_json::json!({ "email": email }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let code = app.email.last_code_for(email).expect("delivered code");

    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/register",
            serde_json::json!({ "email": email, "password": password, "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    session_cookie_pair(&response).expect("session cookie")
}

#[tokio::test]
async fn register_flow_sets_session_cookie() {
    let app = setup();

    let cookie = register(&app, "new@x.com", "password123").await;
    assert!(cookie.starts_with("session_id="));

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["email"], "new@x.com");
}

#[tokio::test]
async fn session_cookie_is_hardened() {
    let app = setup();

    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/send-code",
            serde_json::json!({ "email": "a@x.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let code = app.email.last_code_for("a@x.com").unwrap();
    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/register",
            serde_json::json!({ "email": "a@x.com", "password": "password123", "code": code }),
        ))
        .await
        .unwrap();

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Domain="));
    assert!(set_cookie.contains("example.test"));
}

#[tokio::test]
async fn duplicate_registration_rejected() {
    let app = setup();
    register(&app, "dup@x.com", "password123").await;

    // Fresh code, same email.
    app.app
        .clone()
        .oneshot(json_post(
            "/api/auth/send-code",
            serde_json::json!({ "email": "dup@x.com" }),
        ))
        .await
        .unwrap();
    let code = app.email.last_code_for("dup@x.com").unwrap();

    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/register",
            serde_json::json!({ "email": "dup@x.com", "password": "password456", "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn invalid_email_rejected_on_send_code() {
    let app = setup();

    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/send-code",
            serde_json::json!({ "email": "not-an-email" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn resend_within_cooldown_is_rate_limited() {
    let app = setup_with_codes(CodePolicy::new(300, 60, 5));

    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/send-code",
            serde_json::json!({ "email": "limited@x.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/send-code",
            serde_json::json!({ "email": "limited@x.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(header::RETRY_AFTER).is_some());
}

#[tokio::test]
async fn login_with_wrong_password_rejected() {
    let app = setup();
    register(&app, "a@x.com", "password123").await;

    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/login",
            serde_json::json!({ "email": "a@x.com", "password": "wrongpassword" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    // Unknown email gets the same answer.
    let response = app
        .app
        .clone()
        .oneshot(json_post(
            "/api/auth/login",
            serde_json::json!({ "email": "ghost@x.com", "password": "password123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn google_callback_merges_onto_existing_account() {
    let app = setup();
    let cookie = register(&app, "merge@x.com", "password123").await;

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let registered = body_json(response).await;

    // Start the flow to obtain a valid state token.
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/google/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    let state = location.split("state=").nth(1).unwrap();

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/auth/google/callback?code=provider-code&state={}",
                    state
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap(),
        "https://app.example.test"
    );

    // Callback session resolves to the original account.
    let google_cookie = session_cookie_pair(&response).expect("session cookie");
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, &google_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let merged = body_json(response).await;

    assert_eq!(merged["id"], registered["id"]);
    assert_eq!(merged["avatar_url"], "https://lh3.example/avatar");
}

#[tokio::test]
async fn google_callback_with_bad_state_redirects_to_error_page() {
    let app = setup();

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/google/callback?code=provider-code&state=forged")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap(),
        "https://app.example.test/auth/error"
    );
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let app = setup();
    let cookie = register(&app, "a@x.com", "password123").await;

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_without_cookie_is_unauthorized() {
    let app = setup();

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_check_reports_healthy() {
    let app = setup();

    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}
