//! Tessera Store - token store backends and security combinators
//!
//! # Backends
//!
//! - [`DatabaseTokenStore`]: opaque random identifiers over SQLite
//! - [`JsonTokenStore`]: the token itself, base64url encoded
//! - [`SessionTokenStore`]: server-side session bound to a cookie
//! - [`SignedJwtTokenStore`], [`EncryptedJwtTokenStore`]: self-contained JWTs
//! - [`IntrospectionTokenStore`], [`JwtAccessTokenStore`]: verify tokens
//!   issued by an external authorization server
//!
//! # Combinators
//!
//! [`HmacTokenStore`] adds authenticity and [`EncryptedTokenStore`] adds
//! confidentiality and authenticity to any delegate. [`compose`] builds a
//! chain from [`tessera_core::TesseraConfig`] and checks its guarantees.

#![forbid(unsafe_code)]

/// SQLite-backed opaque token store
pub mod database;

/// Background deletion of expired rows
pub mod sweeper;

/// Client-encoded JSON tokens
pub mod json;

/// HMAC-SHA256 authenticity combinator
pub mod mac;

/// XChaCha20-Poly1305 combinator
pub mod aead;

/// Compact JWS and JWE
pub mod jose;

mod claims;

/// Signed JWT store
pub mod signed_jwt;

/// Encrypted JWT store with optional allow-list
pub mod encrypted_jwt;

/// Externally issued JWT access tokens
pub mod access_token;

/// OAuth2 token introspection
pub mod introspection;

/// Cookie session store
pub mod session;

/// Store chains built from configuration
pub mod compose;

pub use aead::EncryptedTokenStore;
pub use access_token::JwtAccessTokenStore;
pub use compose::{compose, compose_secure, ComposedStore, SecureStore};
pub use database::{DatabaseTokenStore, TokenTable};
pub use encrypted_jwt::EncryptedJwtTokenStore;
pub use introspection::IntrospectionTokenStore;
pub use jose::{JweKey, JwsKey};
pub use json::JsonTokenStore;
pub use mac::HmacTokenStore;
pub use session::{SessionRegistry, SessionTokenStore};
pub use signed_jwt::SignedJwtTokenStore;
pub use sweeper::ExpirySweeper;
