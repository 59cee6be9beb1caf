//! Authenticated client for the Oculara eye-health API
//!
//! Layered bottom-up:
//! - [`storage`]: secret persistence behind the [`storage::SecretStore`]
//!   trait, with an OS keychain backend and an in-memory one for tests
//! - [`http`]: the raw transport over a shared `reqwest` client
//! - [`client`]: bearer attachment, 401 interception, and coalesced
//!   token refresh with a single replay
//! - [`services`]: one typed wrapper per backend resource
//! - [`query`]: keyed cache with deduplication, staleness, bounded
//!   retry, and invalidation
//! - [`state`] + [`queries`]: the assembled application surface
//!
//! ```no_run
//! use std::sync::Arc;
//! use oculara_client::{ApiConfig, AppState};
//! use oculara_client::storage::KeychainStore;
//!
//! # async fn run() -> Result<(), oculara_client::ApiError> {
//! let state = AppState::new(
//!     ApiConfig::from_env(),
//!     Arc::new(KeychainStore::new("oculara")),
//! )?;
//! state.init().await?;
//! let exercises = state.exercises().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod queries;
pub mod query;
pub mod retry;
pub mod services;
pub mod state;
pub mod storage;

pub use client::{ApiClient, SessionStatus};
pub use config::ApiConfig;
pub use error::{ApiError, ErrorCategory};
pub use http::FilePayload;
pub use query::{FetchOptions, FetchStatus, QueryClient, QueryKey, QueryState, QuerySubscription};
pub use retry::RetryPolicy;
pub use state::AppState;
