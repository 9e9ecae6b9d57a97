//! # Managed Token Library
//!
//! Keeps an OAuth2 client-credentials access token fresh in the background
//! and hands it out to callers without blocking on the network.
//!
//! Modules:
//! - `config` - YAML service configuration, loading and validation
//! - `cache` - token record and the atomically swapped cache slot
//! - `sources` - credential sources and the token endpoint client
//! - `resilience` - backoff policy and the single-admission refresh gate
//! - `manager` - lifecycle facade and the background refresh scheduler
//! - `server`, `observability` - HTTP surface and prometheus metrics

pub mod cache;
pub mod config;
pub mod error;
pub mod manager;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod sources;
pub mod tests;
pub mod utils;


pub use crate::config::sources::ServiceConfig;
pub use crate::error::TokenError;
pub use crate::manager::{AutoManagedTokenManager, ManagerState, RefreshSettings};
pub use crate::sources::{CredentialPair, CredentialSource, TokenEndpointClient, TokenExchange};
