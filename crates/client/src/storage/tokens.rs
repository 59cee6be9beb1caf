//! Token storage helpers layered on top of [`SecretStore`]
//!
//! The backend issues an opaque access token and a refresh token; both
//! live under stable keys so they survive process restarts. The pair
//! invariant: a lone access token is never persisted without its refresh
//! counterpart (the access half may be replaced in place after a
//! refresh). A denormalized copy of the signed-in user's profile is kept
//! alongside for offline display.

use std::sync::Arc;

use oculara_domain::User;
use tracing::{debug, info};

use super::SecretStore;
use crate::error::ApiError;

const ACCESS_TOKEN_KEY: &str = "auth_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const PROFILE_KEY: &str = "profile";

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token persistence over a generic secret store
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn SecretStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Current access token, if any
    pub async fn access_token(&self) -> Result<Option<String>, ApiError> {
        self.store.get(ACCESS_TOKEN_KEY).await
    }

    /// Current refresh token, if any
    pub async fn refresh_token(&self) -> Result<Option<String>, ApiError> {
        self.store.get(REFRESH_TOKEN_KEY).await
    }

    /// Persist a full token pair (login, register, or rotated refresh)
    pub async fn set_pair(&self, pair: &TokenPair) -> Result<(), ApiError> {
        self.store.set(ACCESS_TOKEN_KEY, &pair.access_token).await?;
        self.store.set(REFRESH_TOKEN_KEY, &pair.refresh_token).await?;
        debug!("token pair stored");
        Ok(())
    }

    /// Replace only the access token after a non-rotating refresh
    pub async fn set_access_token(&self, token: &str) -> Result<(), ApiError> {
        self.store.set(ACCESS_TOKEN_KEY, token).await?;
        debug!("access token replaced");
        Ok(())
    }

    /// Remove both tokens (logout or irrecoverable refresh failure)
    pub async fn clear(&self) -> Result<(), ApiError> {
        self.store.remove(ACCESS_TOKEN_KEY).await?;
        self.store.remove(REFRESH_TOKEN_KEY).await?;
        info!("tokens cleared");
        Ok(())
    }

    /// Whether an access token is currently persisted
    pub async fn is_authenticated(&self) -> Result<bool, ApiError> {
        Ok(self.access_token().await?.is_some())
    }

    /// Cached copy of the signed-in user's profile, for offline display
    pub async fn cached_profile(&self) -> Result<Option<User>, ApiError> {
        match self.store.get(PROFILE_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| ApiError::Parse(format!("cached profile is malformed: {e}"))),
            None => Ok(None),
        }
    }

    pub async fn set_cached_profile(&self, user: &User) -> Result<(), ApiError> {
        let raw = serde_json::to_string(user)
            .map_err(|e| ApiError::Storage(format!("failed to serialize profile: {e}")))?;
        self.store.set(PROFILE_KEY, &raw).await
    }

    pub async fn clear_cached_profile(&self) -> Result<(), ApiError> {
        self.store.remove(PROFILE_KEY).await
    }
}
