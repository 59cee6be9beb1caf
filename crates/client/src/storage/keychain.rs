//! Platform keychain secret store
//!
//! Thin wrapper over the platform keychain (macOS Keychain, Windows
//! Credential Manager, Linux Secret Service) keyed by a service name.
//! Keychain APIs are blocking, so calls run on the blocking pool.

use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

use super::SecretStore;
use crate::error::ApiError;

/// Secret store backed by the platform keychain
pub struct KeychainStore {
    service_name: String,
}

impl KeychainStore {
    /// Create a store for a specific service
    ///
    /// # Arguments
    /// * `service_name` - Service identifier (e.g., "Oculara.auth")
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    fn entry(&self, key: &str) -> Result<Entry, ApiError> {
        Entry::new(&self.service_name, key)
            .map_err(|e| ApiError::Storage(format!("failed to open keychain entry {key}: {e}")))
    }
}

#[async_trait]
impl SecretStore for KeychainStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        debug!(service = %self.service_name, key = %key, "reading secret from keychain");

        let entry = self.entry(key)?;
        let result = tokio::task::spawn_blocking(move || entry.get_password())
            .await
            .map_err(|e| ApiError::Storage(format!("keychain task failed: {e}")))?;

        match result {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ApiError::Storage(format!("failed to read secret {key}: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        debug!(service = %self.service_name, key = %key, "storing secret in keychain");

        let entry = self.entry(key)?;
        let value = value.to_string();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || entry.set_password(&value))
            .await
            .map_err(|e| ApiError::Storage(format!("keychain task failed: {e}")))?
            .map_err(|e| ApiError::Storage(format!("failed to store secret {key}: {e}")))
    }

    async fn remove(&self, key: &str) -> Result<(), ApiError> {
        debug!(service = %self.service_name, key = %key, "deleting secret from keychain");

        let entry = self.entry(key)?;
        let key = key.to_string();
        let result = tokio::task::spawn_blocking(move || entry.delete_credential())
            .await
            .map_err(|e| ApiError::Storage(format!("keychain task failed: {e}")))?;

        match result {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ApiError::Storage(format!("failed to delete secret {key}: {e}"))),
        }
    }
}
