//! API client for the user-management REST API.
//!
//! `ApiClient` exposes login/registration and the profile and admin
//! endpoints. Login and registration talk to the transport directly; every
//! other call goes through the `SessionGuard` so an expired access token is
//! renewed transparently.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::auth::{Credential, CredentialStore, Navigator, SessionGuard};
use crate::config::Config;
use crate::models::{ApiEnvelope, LoginRequest, RegisterRequest, User, UserUpdate};

use super::request::{ApiRequest, ApiResponse};
use super::transport::ReqwestTransport;
use super::ApiError;

// ============================================================================
// Endpoints
// ============================================================================

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const PROFILE_PATH: &str = "/adminuser/get-profile";
const ALL_USERS_PATH: &str = "/admin/get-all-users";

fn user_path(id: i64) -> String {
    format!("/admin/get-users/{}", id)
}

fn update_path(id: i64) -> String {
    format!("/admin/update/{}", id)
}

fn delete_path(id: i64) -> String {
    format!("/admin/delete/{}", id)
}

/// Clone is cheap - the guard shares its transport and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    guard: SessionGuard,
}

impl ApiClient {
    pub fn new(guard: SessionGuard) -> Self {
        Self { guard }
    }

    /// Create a client talking to `config.base_url` over reqwest.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(&config.base_url, config.request_timeout())?;
        let guard = SessionGuard::new(Arc::new(transport), store, navigator, config.guard_config());
        Ok(Self::new(guard))
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    /// True if an access token is stored. It may still be expired.
    pub fn is_authenticated(&self) -> bool {
        self.guard
            .current_credential()
            .map(|c| c.has_access_token())
            .unwrap_or(false)
    }

    // ===== Authentication =====

    /// Log in and store the issued credential.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;

        let response = self.send_unguarded(&request).await?;
        Self::envelope(&response)?;
        let credential = self
            .guard
            .config()
            .token_format
            .parse_credential(&response.body, None)?;

        self.guard
            .store()
            .set(&credential)
            .context("Failed to store credentials after login")?;
        info!(email = email, "Logged in");
        Ok(credential)
    }

    /// Register a new account. The server may or may not echo the user.
    pub async fn register(&self, registration: &RegisterRequest) -> Result<Option<User>> {
        let request = ApiRequest::post(REGISTER_PATH).json(registration)?;
        let response = self.send_unguarded(&request).await?;
        let envelope = Self::envelope(&response)?;
        info!(email = %registration.email, "Registered account");
        Ok(envelope.our_users)
    }

    /// Forget the stored credential. There is no server-side logout.
    pub fn logout(&self) -> Result<()> {
        self.guard
            .store()
            .clear()
            .context("Failed to clear credentials")?;
        info!("Logged out");
        Ok(())
    }

    // ===== Profile and Admin Operations =====

    pub async fn profile(&self) -> Result<User> {
        let envelope = self.call(ApiRequest::get(PROFILE_PATH)).await?;
        Ok(envelope.user()?)
    }

    /// All users (admin only).
    pub async fn all_users(&self) -> Result<Vec<User>> {
        let envelope = self.call(ApiRequest::get(ALL_USERS_PATH)).await?;
        let users = envelope.users();
        debug!(count = users.len(), "Fetched users");
        Ok(users)
    }

    pub async fn user(&self, id: i64) -> Result<User> {
        let envelope = self
            .call(ApiRequest::get(user_path(id)))
            .await
            .with_context(|| format!("Failed to fetch user {}", id))?;
        Ok(envelope.user()?)
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<User> {
        let request = ApiRequest::put(update_path(id)).json(update)?;
        let envelope = self
            .call(request)
            .await
            .with_context(|| format!("Failed to update user {}", id))?;
        info!(id, "Updated user");
        Ok(envelope.user()?)
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        self.call(ApiRequest::delete(delete_path(id)))
            .await
            .with_context(|| format!("Failed to delete user {}", id))?;
        info!(id, "Deleted user");
        Ok(())
    }

    /// Update the logged-in user through the admin update endpoint, which
    /// both roles may call for their own id.
    pub async fn update_own_profile(&self, update: &UserUpdate) -> Result<User> {
        let me = self.profile().await?;
        self.update_user(me.id, update).await
    }

    // ===== Helpers =====

    async fn send_unguarded(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.guard
            .transport()
            .send(request)
            .await
            .map_err(ApiError::from)
    }

    async fn call(&self, request: ApiRequest) -> Result<ApiEnvelope, ApiError> {
        let response = self.guard.execute(request).await?;
        Self::envelope(&response)
    }

    fn envelope(response: &ApiResponse) -> Result<ApiEnvelope, ApiError> {
        let envelope: ApiEnvelope = response.json()?;
        envelope.into_result()
    }
}
