//! Client-encoded token store.
//!
//! The identifier is the token itself, JSON serialized and base64url
//! encoded. It is neither confidential nor authenticated and only makes
//! sense underneath [`crate::HmacTokenStore`] or [`crate::EncryptedTokenStore`].

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::encoding::{base64url_decode, base64url_encode};
use tessera_core::{
    Guarantees, RequestContext, Result, SharedClock, TesseraError, Token, TokenId, TokenStore,
};

#[derive(Debug, Serialize, Deserialize)]
struct EncodedToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    exp: i64,
    #[serde(default)]
    attrs: BTreeMap<String, String>,
}

/// Token serialized into its own identifier
#[derive(Debug, Clone)]
pub struct JsonTokenStore {
    clock: SharedClock,
}

impl JsonTokenStore {
    /// Create a store checking expiry against `clock`
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    fn decode(token_id: &str) -> Option<Token> {
        let bytes = base64url_decode(token_id)?;
        let encoded: EncodedToken = serde_json::from_slice(&bytes).ok()?;
        let expiry = Utc.timestamp_opt(encoded.exp, 0).single()?;
        Some(Token::from_parts(expiry, encoded.sub, encoded.attrs))
    }
}

#[async_trait]
impl TokenStore for JsonTokenStore {
    fn backend(&self) -> &'static str {
        "json"
    }

    fn guarantees(&self) -> Guarantees {
        Guarantees::NONE
    }

    async fn create(&self, _ctx: &RequestContext, token: Token) -> Result<TokenId> {
        let (expiry, sub, attrs) = token.into_parts();
        let encoded = EncodedToken {
            sub,
            exp: expiry.timestamp(),
            attrs,
        };
        let json = serde_json::to_vec(&encoded)?;
        Ok(TokenId::new(base64url_encode(json)))
    }

    async fn read(&self, _ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        let Some(token) = Self::decode(token_id.as_str()) else {
            tracing::debug!(backend = self.backend(), "rejected undecodable token");
            return Ok(None);
        };
        Ok(Some(token).filter(|t| t.is_valid_at(self.clock.now())))
    }

    async fn revoke(&self, _ctx: &RequestContext, _token_id: &TokenId) -> Result<()> {
        Err(TesseraError::unsupported("revoke", self.backend()))
    }
}
