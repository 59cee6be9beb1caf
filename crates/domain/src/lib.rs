//! # Oculara Domain
//!
//! Data models for the Oculara eye-health REST API.
//!
//! This crate contains:
//! - Request/response types for every backend resource
//! - Enumerations shared across resources (difficulty, risk level, ...)
//!
//! ## Architecture
//! - No dependencies on other Oculara crates
//! - Pure serde models; wire names are camelCase to match the backend

#![forbid(unsafe_code)]

pub mod types;

pub use types::*;
