//! Persistent secret storage
//!
//! The backend-facing client only needs a key-value store with get, set,
//! and remove; everything token-specific is layered on top in
//! [`tokens::TokenStore`]. Two backends are provided: the platform
//! keychain for real deployments and an in-memory map for tests.

pub mod keychain;
pub mod tokens;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ApiError;

pub use keychain::KeychainStore;
pub use tokens::{TokenPair, TokenStore};

/// Trait for persistent key-value secret storage
///
/// Abstracts the platform store so the token layer can be tested with an
/// in-memory implementation.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read a value; `None` when the key has never been written
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError>;

    /// Write or overwrite a value
    async fn set(&self, key: &str, value: &str) -> Result<(), ApiError>;

    /// Remove a value (idempotent)
    async fn remove(&self, key: &str) -> Result<(), ApiError>;
}

/// In-memory secret store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        self.values.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ApiError> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
