pub mod auth;

use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::config::AppConfig;

/// Session cookie with the hardening attributes applied uniformly:
/// HttpOnly, SameSite=Lax, parent-domain scoped, Secure per config.
pub(crate) fn session_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie.name.clone(), token))
        .domain(config.cookie.domain.clone())
        .path("/")
        .http_only(true)
        .secure(config.cookie.secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(config.session.ttl_seconds))
        .build()
}

/// Same attributes, zero max-age, so the browser drops the cookie.
pub(crate) fn expired_session_cookie(config: &AppConfig) -> Cookie<'static> {
    Cookie::build((config.cookie.name.clone(), String::new()))
        .domain(config.cookie.domain.clone())
        .path("/")
        .http_only(true)
        .secure(config.cookie.secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}
