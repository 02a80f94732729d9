use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::CookieJar;

use crate::{
    dtos::{
        auth::{AuthResponse, RegisterRequest, SendCodeRequest, UserProfile},
        ErrorResponse,
    },
    error::AppError,
    handlers::session_cookie,
    utils::ValidatedJson,
    AppState,
};

/// Send a verification code to an email address
#[utoipa::path(
    post,
    path = "/api/auth/send-code",
    request_body = SendCodeRequest,
    responses(
        (status = 200, description = "Verification code sent", body = AuthResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 429, description = "Code requested too recently", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn send_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SendCodeRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    state.auth_service.send_code(&req.email).await?;

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            message: "Verification code sent".to_string(),
            user: None,
        }),
    ))
}

/// Register a new account with email, password, and verification code
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input, bad code, or email taken", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    let (user, token) = state
        .auth_service
        .register(&req.email, &req.password, &req.code)
        .await?;

    let jar = jar.add(session_cookie(&state.config, token));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            message: "Registration successful".to_string(),
            user: Some(UserProfile::from(&user)),
        }),
    ))
}
