use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::CookieJar;

use crate::{
    dtos::{
        auth::{AuthResponse, LoginRequest, UserProfile},
        ErrorResponse,
    },
    error::AppError,
    handlers::{expired_session_cookie, session_cookie},
    utils::ValidatedJson,
    AppState,
};

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    let (user, token) = state.auth_service.login(&req.email, &req.password).await?;

    let jar = jar.add(session_cookie(&state.config, token));

    Ok((
        StatusCode::OK,
        jar,
        Json(AuthResponse {
            message: "Login successful".to_string(),
            user: Some(UserProfile::from(&user)),
        }),
    ))
}

/// Return the profile of the authenticated user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Authenticated user profile", body = UserProfile),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn me(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<UserProfile>, AppError> {
    let token = jar
        .get(&state.config.cookie.name)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))?;

    let user = state.auth_service.whoami(&token).await?;

    Ok(Json(UserProfile::from(&user)))
}

/// Log out the current session
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = AuthResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (StatusCode, CookieJar, Json<AuthResponse>) {
    // Best effort: an absent, expired, or already-revoked token still
    // yields a 200 and a cleared cookie.
    if let Some(cookie) = jar.get(&state.config.cookie.name) {
        if let Err(err) = state.auth_service.logout(cookie.value()).await {
            tracing::warn!(error = %err, "Session revocation failed during logout");
        }
    }

    let jar = jar.add(expired_session_cookie(&state.config));

    (
        StatusCode::OK,
        jar,
        Json(AuthResponse {
            message: "Logged out".to_string(),
            user: None,
        }),
    )
}
