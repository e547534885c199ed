//! Token store contract
//!
//! Every backend implements [`TokenStore`]. What a backend guarantees about
//! the identifiers it hands out is expressed twice:
//!
//! - statically, through the marker traits [`ConfidentialTokenStore`] and
//!   [`AuthenticatedTokenStore`]. [`SecureTokenStore`] is implemented for
//!   exactly the stores that carry both, so an API that demands a secure
//!   store rejects anything weaker at compile time;
//! - at runtime, through [`TokenStore::guarantees`], used when a store chain
//!   is assembled from configuration and has to be checked once at
//!   composition time.
//!
//! Combinators own their delegate. A chain like
//! `HmacTokenStore<DatabaseTokenStore>` is a single owning value with no
//! shared state between layers.

use crate::context::RequestContext;
use crate::errors::Result;
use crate::token::{Token, TokenId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Properties a store provides for the identifiers it issues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Guarantees {
    /// The identifier reveals nothing about the token's contents
    pub confidential: bool,
    /// The identifier cannot be forged or altered without detection
    pub authenticated: bool,
    /// Server-side state exists, so `revoke` really invalidates the token
    pub revocable: bool,
}

impl Guarantees {
    /// No guarantees at all
    pub const NONE: Self = Self {
        confidential: false,
        authenticated: false,
        revocable: false,
    };

    /// Confidential and authenticated
    pub fn is_secure(&self) -> bool {
        self.confidential && self.authenticated
    }

    /// Same guarantees plus confidentiality
    pub fn with_confidential(mut self) -> Self {
        self.confidential = true;
        self
    }

    /// Same guarantees plus authenticity
    pub fn with_authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    /// Same guarantees plus revocability
    pub fn with_revocable(mut self) -> Self {
        self.revocable = true;
        self
    }
}

impl fmt::Display for Guarantees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.confidential {
            parts.push("confidential");
        }
        if self.authenticated {
            parts.push("authenticated");
        }
        if self.revocable {
            parts.push("revocable");
        }
        if parts.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&parts.join("+"))
        }
    }
}

/// Issue, validate and revoke tokens
///
/// `read` never fails because an identifier is bad: malformed, tampered,
/// expired, revoked and unknown identifiers all come back as `Ok(None)`.
/// An `Err` from `read` means the backend itself could not answer (storage
/// or network failure) and the caller must deny.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Short backend name used in errors and logs
    fn backend(&self) -> &'static str;

    /// Guarantees of identifiers issued by this store
    fn guarantees(&self) -> Guarantees;

    /// Issue an identifier for `token`
    async fn create(&self, ctx: &RequestContext, token: Token) -> Result<TokenId>;

    /// Validate an identifier and recover its token
    async fn read(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>>;

    /// Invalidate an identifier. Stateless backends return
    /// [`crate::TesseraError::Unsupported`]; stateful ones are idempotent.
    async fn revoke(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<()>;
}

/// Identifiers reveal nothing about the token they stand for
pub trait ConfidentialTokenStore: TokenStore {}

/// Identifiers are integrity protected and cannot be forged
pub trait AuthenticatedTokenStore: TokenStore {}

/// Both confidential and authenticated
pub trait SecureTokenStore: ConfidentialTokenStore + AuthenticatedTokenStore {}

impl<T: ConfidentialTokenStore + AuthenticatedTokenStore + ?Sized> SecureTokenStore for T {}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Box<T> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn guarantees(&self) -> Guarantees {
        (**self).guarantees()
    }

    async fn create(&self, ctx: &RequestContext, token: Token) -> Result<TokenId> {
        (**self).create(ctx, token).await
    }

    async fn read(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        (**self).read(ctx, token_id).await
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<()> {
        (**self).revoke(ctx, token_id).await
    }
}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn guarantees(&self) -> Guarantees {
        (**self).guarantees()
    }

    async fn create(&self, ctx: &RequestContext, token: Token) -> Result<TokenId> {
        (**self).create(ctx, token).await
    }

    async fn read(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        (**self).read(ctx, token_id).await
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<()> {
        (**self).revoke(ctx, token_id).await
    }
}

impl<T: ConfidentialTokenStore + ?Sized> ConfidentialTokenStore for Box<T> {}
impl<T: AuthenticatedTokenStore + ?Sized> AuthenticatedTokenStore for Box<T> {}
impl<T: ConfidentialTokenStore + ?Sized> ConfidentialTokenStore for Arc<T> {}
impl<T: AuthenticatedTokenStore + ?Sized> AuthenticatedTokenStore for Arc<T> {}
