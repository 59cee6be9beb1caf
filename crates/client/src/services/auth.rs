//! Account lifecycle: sign-in, sign-up, sign-out, profile

use std::sync::Arc;

use tracing::{info, warn};

use oculara_domain::{AuthResponse, LoginRequest, RegisterRequest, User, UserUpdate};

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::storage::{TokenPair, TokenStore};

#[derive(Clone)]
pub struct AuthService {
    client: Arc<ApiClient>,
    tokens: TokenStore,
}

impl AuthService {
    pub fn new(client: Arc<ApiClient>, tokens: TokenStore) -> Self {
        Self { client, tokens }
    }

    /// Sign in and persist the session locally
    pub async fn login(&self, request: &LoginRequest) -> Result<User, ApiError> {
        let response: AuthResponse = self.client.post("/auth/login", request).await?;
        self.establish_session(response).await
    }

    /// Create an account; the server signs the new user in directly
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        let response: AuthResponse = self.client.post("/auth/register", request).await?;
        self.establish_session(response).await
    }

    async fn establish_session(&self, response: AuthResponse) -> Result<User, ApiError> {
        self.tokens
            .set_pair(&TokenPair {
                access_token: response.token,
                refresh_token: response.refresh_token,
            })
            .await?;
        self.cache_profile(&response.user).await?;
        self.client.mark_signed_in();
        info!(user_id = %response.user.id, "session established");
        Ok(response.user)
    }

    /// Sign out. The server is notified best-effort; local credentials
    /// are cleared whether or not that call succeeds, so the device
    /// never stays signed in against a dead session.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let notify: Result<serde_json::Value, ApiError> =
            self.client.post_empty("/auth/logout").await;
        if let Err(err) = notify {
            warn!(error = %err, "server logout failed, clearing local session anyway");
        }
        self.clear_session().await
    }

    async fn clear_session(&self) -> Result<(), ApiError> {
        self.tokens.clear().await?;
        self.tokens.clear_cached_profile().await?;
        self.client.mark_signed_out();
        Ok(())
    }

    pub async fn profile(&self) -> Result<User, ApiError> {
        let user: User = self.client.get("/users/profile").await?;
        self.cache_profile(&user).await?;
        Ok(user)
    }

    pub async fn update_profile(&self, update: &UserUpdate) -> Result<User, ApiError> {
        let user: User = self.client.put("/users/profile", update).await?;
        self.cache_profile(&user).await?;
        Ok(user)
    }

    /// Permanently delete the account, then clear the local session
    pub async fn delete_account(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.client.delete("/users/account").await?;
        self.clear_session().await
    }

    /// Profile snapshot persisted at last sign-in/refresh, for rendering
    /// before the first network round-trip completes
    pub async fn cached_profile(&self) -> Result<Option<User>, ApiError> {
        self.tokens.cached_profile().await
    }

    async fn cache_profile(&self, user: &User) -> Result<(), ApiError> {
        self.tokens.set_cached_profile(user).await
    }
}
