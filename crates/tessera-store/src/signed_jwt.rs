//! Self-contained signed JWT store.
//!
//! Stateless and authenticated only: anyone holding the token can read its
//! claims, and there is nothing server-side to revoke.

use crate::claims::TokenClaims;
use crate::jose::JwsKey;
use async_trait::async_trait;
use tessera_core::{
    AuthenticatedTokenStore, Guarantees, RequestContext, Result, SharedClock, TesseraError, Token,
    TokenId, TokenStore,
};
use uuid::Uuid;

/// Signed JWT carrying subject, audience, expiry and attributes
#[derive(Debug)]
pub struct SignedJwtTokenStore {
    key: JwsKey,
    audience: String,
    clock: SharedClock,
}

impl SignedJwtTokenStore {
    /// Store signing with `key` for `audience`
    pub fn new(key: JwsKey, audience: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            key,
            audience: audience.into(),
            clock,
        }
    }

    /// Expected audience
    pub fn audience(&self) -> &str {
        &self.audience
    }
}

#[async_trait]
impl TokenStore for SignedJwtTokenStore {
    fn backend(&self) -> &'static str {
        "signed_jwt"
    }

    fn guarantees(&self) -> Guarantees {
        Guarantees::NONE.with_authenticated()
    }

    async fn create(&self, _ctx: &RequestContext, token: Token) -> Result<TokenId> {
        let claims = TokenClaims::new(
            token,
            &self.audience,
            Some(Uuid::new_v4().to_string()),
            self.clock.now(),
        );
        let jws = self.key.sign(&serde_json::to_vec(&claims)?)?;
        Ok(TokenId::new(jws))
    }

    async fn read(&self, _ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        let token = self
            .key
            .verify(token_id.as_str())
            .and_then(|payload| TokenClaims::parse(&payload))
            .and_then(|claims| claims.into_token(&self.audience, self.clock.now()));
        if token.is_none() {
            tracing::debug!(backend = self.backend(), "rejected signed token");
        }
        Ok(token)
    }

    async fn revoke(&self, _ctx: &RequestContext, _token_id: &TokenId) -> Result<()> {
        Err(TesseraError::unsupported("revoke", self.backend()))
    }
}

impl AuthenticatedTokenStore for SignedJwtTokenStore {}
