//! Auth orchestrator - composes the stores into the user-facing operations
//! and fixes the error precedence for each.

use std::sync::Arc;

use crate::models::User;
use crate::services::{
    CodeStore, EmailProvider, GoogleAuth, IdentityStore, ServiceError, SessionStore,
};
use crate::utils::{hash_password, hash_password_sync, verify_password, Password, PasswordHashString};

#[derive(Clone)]
pub struct AuthService {
    identity: Arc<dyn IdentityStore>,
    codes: Arc<dyn CodeStore>,
    sessions: Arc<dyn SessionStore>,
    email: Arc<dyn EmailProvider>,
    google: Arc<dyn GoogleAuth>,
    // Verified against when no stored hash applies, so response timing does
    // not reveal whether an account exists or is provider-only.
    dummy_hash: PasswordHashString,
}

impl AuthService {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        codes: Arc<dyn CodeStore>,
        sessions: Arc<dyn SessionStore>,
        email: Arc<dyn EmailProvider>,
        google: Arc<dyn GoogleAuth>,
    ) -> Result<Self, ServiceError> {
        let dummy_hash = hash_password_sync(&Password::new(
            "placeholder-never-a-real-credential".to_string(),
        ))?;

        Ok(Self {
            identity,
            codes,
            sessions,
            email,
            google,
            dummy_hash,
        })
    }

    /// Issue and deliver a verification code. Never reveals whether the
    /// email is already registered.
    pub async fn send_code(&self, email: &str) -> Result<(), ServiceError> {
        let email = normalize_email(email);

        let code = self.codes.issue(&email).await?;
        self.email
            .send_verification_code(&email, &code.code)
            .await?;

        tracing::info!(email = %email, "Verification code issued");
        Ok(())
    }

    /// Register with email/password, gated on a live verification code.
    /// Returns the created user and a fresh session token. A failed
    /// registration leaves no session and no user row.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        code: &str,
    ) -> Result<(User, String), ServiceError> {
        let email = normalize_email(email);

        self.codes.validate(&email, code).await?;

        let password_hash = hash_password(Password::new(password.to_string())).await?;

        let user = self
            .identity
            .create_with_password(&email, password_hash.as_str())
            .await?;

        let token = self.sessions.issue(user.user_id).await?;

        tracing::info!(user_id = %user.user_id, "User registered");
        Ok((user, token))
    }

    /// Email/password login. Unknown email, provider-only account, and a
    /// wrong password all collapse to `InvalidCredentials`.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), ServiceError> {
        let email = normalize_email(email);

        let found = self.identity.find_by_email(&email).await?;

        let (user, stored_hash) = match found {
            Some(user) => match user.password_hash.clone() {
                Some(hash) => (Some(user), PasswordHashString::new(hash)),
                None => (None, self.dummy_hash.clone()),
            },
            None => (None, self.dummy_hash.clone()),
        };

        let verified = verify_password(Password::new(password.to_string()), stored_hash).await;

        match (user, verified) {
            (Some(user), true) => {
                let token = self.sessions.issue(user.user_id).await?;
                tracing::info!(user_id = %user.user_id, "User logged in");
                Ok((user, token))
            }
            _ => Err(ServiceError::InvalidCredentials),
        }
    }

    /// Consent-screen URL with a freshly issued single-use state token.
    pub async fn google_login_url(&self) -> Result<String, ServiceError> {
        let state = self.sessions.issue_login_state().await?;
        Ok(self.google.authorize_url(&state))
    }

    /// Handle the provider callback: consume the state, exchange the code,
    /// resolve-or-merge the identity, issue a session.
    pub async fn google_callback(
        &self,
        state: &str,
        code: &str,
    ) -> Result<(User, String), ServiceError> {
        if !self.sessions.consume_login_state(state).await? {
            return Err(ServiceError::InvalidLoginState);
        }

        let profile = self.google.exchange_code(code).await?;
        let email = normalize_email(&profile.email);

        let user = self
            .identity
            .resolve_or_merge_google(&profile.google_id, &email, profile.avatar_url.as_deref())
            .await?;

        let token = self.sessions.issue(user.user_id).await?;

        tracing::info!(user_id = %user.user_id, "User logged in via Google");
        Ok((user, token))
    }

    /// Resolve a session token to its user profile.
    pub async fn whoami(&self, token: &str) -> Result<User, ServiceError> {
        let user_id = self
            .sessions
            .validate(token)
            .await?
            .ok_or(ServiceError::Unauthenticated)?;

        self.identity
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::Unauthenticated)
    }

    /// Idempotent session teardown.
    pub async fn logout(&self, token: &str) -> Result<(), ServiceError> {
        self.sessions.revoke(token).await
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
