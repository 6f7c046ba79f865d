//! ============================================================================
//! Auth Store - Login, registration and profile updates
//! ============================================================================
//! States: anonymous <-> authenticated. The identity itself lives in the
//! `SessionManager`; this store adds the loading flag and error banner and
//! drives the transitions.
//! ============================================================================

use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::failure;
use crate::client::{json_body, ApiClient, RequestOptions};
use crate::error::ApiError;
use crate::types::{AuthResponse, ProfileUpdate, RegisterFields, TokenPair, UserProfile};

pub const INVALID_RESPONSE: &str = "Invalid response from server";
pub const MIN_PASSWORD_LEN: usize = 6;

/// Snapshot of the auth store as a UI would render it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub user: Option<UserProfile>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct Status {
    is_loading: bool,
    error: Option<String>,
}

pub struct AuthStore {
    client: Arc<ApiClient>,
    status: RwLock<Status>,
}

impl AuthStore {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            status: RwLock::new(Status::default()),
        }
    }

    pub async fn state(&self) -> AuthState {
        let session = self.client.session().snapshot().await;
        let status = self.status.read().await;
        AuthState {
            user: session.user,
            token: session.access_token,
            is_authenticated: session.is_authenticated,
            is_loading: status.is_loading,
            error: status.error.clone(),
        }
    }

    pub async fn error(&self) -> Option<String> {
        self.status.read().await.error.clone()
    }

    pub async fn clear_error(&self) {
        self.status.write().await.error = None;
    }

    async fn begin(&self) {
        let mut status = self.status.write().await;
        status.is_loading = true;
        status.error = None;
    }

    async fn finish(&self, error: Option<String>) {
        let mut status = self.status.write().await;
        status.is_loading = false;
        status.error = error;
    }

    /// Rehydrate from durable storage on startup
    pub async fn restore(&self) -> bool {
        self.client.session().restore().await
    }

    pub async fn login(&self, email: &str, password: &str) -> bool {
        if email.trim().is_empty() || password.is_empty() {
            self.finish(Some("Email and password are required".to_string())).await;
            return false;
        }

        self.begin().await;
        let body = json!({ "email": email.trim(), "password": password });
        let result = self
            .client
            .request::<AuthResponse>("/auth/login", RequestOptions::post(Some(body)).without_refresh())
            .await;
        self.complete_sign_in("Login", result).await
    }

    pub async fn register(&self, fields: RegisterFields) -> bool {
        if let Err(e) = validate_registration(&fields) {
            self.finish(Some(e.to_string())).await;
            return false;
        }

        self.begin().await;
        let result = match json_body(&fields) {
            Ok(body) => {
                self.client
                    .request::<AuthResponse>("/auth/register", RequestOptions::post(Some(body)).without_refresh())
                    .await
            }
            Err(e) => Err(e),
        };
        self.complete_sign_in("Registration", result).await
    }

    async fn complete_sign_in(&self, action: &str, result: Result<AuthResponse, ApiError>) -> bool {
        match result {
            Ok(AuthResponse { access_token: Some(access_token), refresh_token, user: Some(user), .. }) => {
                info!("{} succeeded for {}", action, user.username);
                self.client
                    .session()
                    .establish(user, TokenPair { access_token, refresh_token })
                    .await;
                self.finish(None).await;
                true
            }
            Ok(_) => {
                warn!("{} response missing access_token or user", action);
                self.finish(Some(INVALID_RESPONSE.to_string())).await;
                false
            }
            Err(e) => {
                self.finish(Some(failure(action, &e))).await;
                false
            }
        }
    }

    /// Drop the session locally and in durable storage
    pub async fn logout(&self) {
        self.client.session().clear().await;
        *self.status.write().await = Status::default();
    }

    /// `GET /auth/me`, replacing the session user
    pub async fn fetch_me(&self) -> Option<UserProfile> {
        self.begin().await;
        match self.client.get::<UserProfile>("/auth/me").await {
            Ok(user) => {
                self.client.session().set_user(user.clone()).await;
                self.finish(None).await;
                Some(user)
            }
            Err(e) => {
                self.finish(Some(failure("Fetch profile", &e))).await;
                None
            }
        }
    }

    /// `PATCH /users/me`
    pub async fn update_user(&self, update: ProfileUpdate) -> bool {
        if !self.client.session().is_authenticated().await {
            self.finish(Some(ApiError::NotAuthenticated.to_string())).await;
            return false;
        }
        if update.is_empty() {
            self.finish(Some("Nothing to update".to_string())).await;
            return false;
        }

        self.begin().await;
        match self.client.patch::<UserProfile, _>("/users/me", &update).await {
            Ok(user) => {
                self.client.session().set_user(user).await;
                self.finish(None).await;
                true
            }
            Err(e) => {
                self.finish(Some(failure("Update profile", &e))).await;
                false
            }
        }
    }

    /// `PUT /users/wallet`, then patch the session user's wallet address
    pub async fn update_wallet_address(&self, address: &str) -> bool {
        if !self.client.session().is_authenticated().await {
            self.finish(Some(ApiError::NotAuthenticated.to_string())).await;
            return false;
        }

        self.begin().await;
        let body = json!({ "wallet_address": address });
        match self.client.put::<serde_json::Value, _>("/users/wallet", &body).await {
            Ok(_) => {
                if let Some(mut user) = self.client.session().user().await {
                    user.wallet_address = Some(address.to_string());
                    self.client.session().set_user(user).await;
                }
                self.finish(None).await;
                true
            }
            Err(e) => {
                self.finish(Some(failure("Update wallet address", &e))).await;
                false
            }
        }
    }
}

fn validate_registration(fields: &RegisterFields) -> Result<(), ApiError> {
    if fields.username.trim().is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }
    if !fields.email.contains('@') {
        return Err(ApiError::Validation("A valid email is required".into()));
    }
    if fields.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
