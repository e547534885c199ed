//! Tessera Core - token model and store contract
//!
//! Every other Tessera crate builds on the types defined here.
//!
//! # Layout
//!
//! - [`Token`] and [`TokenId`]: the credential value and its opaque handle
//! - [`TokenStore`]: issue, validate and revoke identifiers
//! - [`ConfidentialTokenStore`], [`AuthenticatedTokenStore`],
//!   [`SecureTokenStore`]: compile-time guarantees of a store
//! - [`RequestContext`]: the inbound request and its request-scoped state
//! - [`TesseraConfig`]: file and environment configuration
//! - [`TesseraError`]: the single error type of the workspace

#![forbid(unsafe_code)]

/// Unified error handling
pub mod errors;

/// Token and token identifier
pub mod token;

/// Inbound request context
pub mod context;

/// Token store contract and guarantee markers
pub mod store;

/// Injectable wall clock
pub mod time;

/// Base64url, hashing and randomness helpers
pub mod encoding;

/// Symmetric key material
pub mod keys;

/// Configuration loading and validation
pub mod config;

pub use config::{ConfigSource, TesseraConfig};
pub use context::{RequestContext, SessionCookie};
pub use errors::{Result, TesseraError};
pub use keys::SecretKey;
pub use store::{
    AuthenticatedTokenStore, ConfidentialTokenStore, Guarantees, SecureTokenStore, TokenStore,
};
pub use time::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use token::{attrs, Token, TokenId};
