//! Google OAuth client - authorization URL construction and the code
//! exchange + profile fetch, modeled as one external-collaborator call.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GoogleOAuthConfig;
use crate::services::ServiceError;

/// What the provider asserts about the authenticated person.
#[derive(Debug, Clone)]
pub struct GoogleProfile {
    pub google_id: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait GoogleAuth: Send + Sync {
    /// Consent-screen URL carrying the anti-forgery state parameter.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange the authorization code for the user's profile.
    async fn exchange_code(&self, code: &str) -> Result<GoogleProfile, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    verified_email: bool,
    picture: Option<String>,
}

pub struct GoogleOauthClient {
    http: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleOauthClient {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl GoogleAuth for GoogleOauthClient {
    fn authorize_url(&self, state: &str) -> String {
        format!(
            "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}",
            self.config.client_id, self.config.redirect_uri, state
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<GoogleProfile, ServiceError> {
        let token_res = self
            .http
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to exchange Google code");
                ServiceError::Provider("Token exchange request failed".to_string())
            })?;

        if !token_res.status().is_success() {
            let status = token_res.status();
            let err_body = token_res.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %err_body, "Google token exchange error");
            return Err(ServiceError::Provider(
                "Token exchange rejected".to_string(),
            ));
        }

        let token_data: GoogleTokenResponse = token_res.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Google token response");
            ServiceError::Provider("Malformed token response".to_string())
        })?;

        let user_info_res = self
            .http
            .get("https://www.googleapis.com/oauth2/v2/userinfo")
            .bearer_auth(token_data.access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to fetch Google user info");
                ServiceError::Provider("Userinfo request failed".to_string())
            })?;

        let user_info: GoogleUserInfo = user_info_res.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Google user info");
            ServiceError::Provider("Malformed userinfo response".to_string())
        })?;

        if !user_info.verified_email {
            return Err(ServiceError::Provider(
                "Google account email not verified".to_string(),
            ));
        }

        Ok(GoogleProfile {
            google_id: user_info.id,
            email: user_info.email,
            avatar_url: user_info.picture,
        })
    }
}

/// Canned-profile client for tests.
pub struct MockGoogleAuth {
    pub profile: GoogleProfile,
}

impl MockGoogleAuth {
    pub fn new(google_id: &str, email: &str, avatar_url: Option<&str>) -> Self {
        Self {
            profile: GoogleProfile {
                google_id: google_id.to_string(),
                email: email.to_string(),
                avatar_url: avatar_url.map(String::from),
            },
        }
    }
}

#[async_trait]
impl GoogleAuth for MockGoogleAuth {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://accounts.google.com/o/oauth2/v2/auth?state={}", state)
    }

    async fn exchange_code(&self, _code: &str) -> Result<GoogleProfile, ServiceError> {
        Ok(self.profile.clone())
    }
}
