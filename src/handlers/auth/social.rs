use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use crate::{
    dtos::auth::GoogleCallbackQuery,
    error::AppError,
    handlers::session_cookie,
    AppState,
};

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Start the Google login flow
#[utoipa::path(
    get,
    path = "/api/auth/google/login",
    responses(
        (status = 302, description = "Redirect to the Google consent screen"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Authentication"
)]
pub async fn google_login(State(state): State<AppState>) -> Result<Response, AppError> {
    let url = state.auth_service.google_login_url().await?;
    Ok(found(&url))
}

/// Handle the Google OAuth callback
#[utoipa::path(
    get,
    path = "/api/auth/google/callback",
    params(
        ("code" = String, Query, description = "Authorization code from Google"),
        ("state" = String, Query, description = "Login state token")
    ),
    responses(
        (status = 302, description = "Redirect to the frontend, with a session cookie on success")
    ),
    tag = "Authentication"
)]
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<GoogleCallbackQuery>,
) -> (CookieJar, Response) {
    match state
        .auth_service
        .google_callback(&query.state, &query.code)
        .await
    {
        Ok((user, token)) => {
            tracing::info!(user_id = %user.user_id, "Google callback completed");
            let jar = jar.add(session_cookie(&state.config, token));
            (jar, found(&state.config.frontend_url))
        }
        // The browser lands on the error page; the cause stays in the logs.
        Err(err) => {
            tracing::warn!(error = %err, "Google callback failed");
            let error_url = format!("{}/auth/error", state.config.frontend_url);
            (jar, found(&error_url))
        }
    }
}
