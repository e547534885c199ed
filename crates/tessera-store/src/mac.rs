//! HMAC authenticity combinator.
//!
//! `create` appends `"." base64url(HMAC-SHA256(key, inner_id))` to whatever
//! identifier the delegate produced. `read` recomputes the tag over the
//! untrusted prefix and compares it in constant time before the delegate
//! ever sees the prefix.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tessera_core::encoding::{base64url_decode, base64url_encode, constant_time_eq};
use tessera_core::{
    AuthenticatedTokenStore, ConfidentialTokenStore, Guarantees, RequestContext, Result,
    SecretKey, TesseraError, Token, TokenId, TokenStore,
};

type HmacSha256 = Hmac<Sha256>;

/// Separator between the inner identifier and its tag
const TAG_SEPARATOR: char = '.';

/// Adds an HMAC-SHA256 tag to a delegate's identifiers
#[derive(Debug)]
pub struct HmacTokenStore<S> {
    delegate: S,
    key: SecretKey,
}

impl<S: TokenStore> HmacTokenStore<S> {
    /// Wrap `delegate`, tagging with `key`
    pub fn new(delegate: S, key: SecretKey) -> Self {
        Self { delegate, key }
    }

    /// Wrapped store
    pub fn delegate(&self) -> &S {
        &self.delegate
    }

    fn tag(&self, data: &[u8]) -> Result<[u8; 32]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.key.as_bytes())
            .map_err(|e| TesseraError::crypto(format!("invalid HMAC key: {e}")))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }

    /// The inner identifier if the tag verifies
    fn verify<'a>(&self, token_id: &'a str) -> Result<Option<&'a str>> {
        let Some((inner, tag)) = token_id.rsplit_once(TAG_SEPARATOR) else {
            return Ok(None);
        };
        let Some(provided) = base64url_decode(tag) else {
            return Ok(None);
        };
        let computed = self.tag(inner.as_bytes())?;
        if constant_time_eq(&provided, &computed) {
            Ok(Some(inner))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl<S: TokenStore> TokenStore for HmacTokenStore<S> {
    fn backend(&self) -> &'static str {
        "hmac"
    }

    fn guarantees(&self) -> Guarantees {
        self.delegate.guarantees().with_authenticated()
    }

    async fn create(&self, ctx: &RequestContext, token: Token) -> Result<TokenId> {
        let inner = self.delegate.create(ctx, token).await?;
        let tag = self.tag(inner.as_str().as_bytes())?;
        Ok(TokenId::new(format!(
            "{}{TAG_SEPARATOR}{}",
            inner.as_str(),
            base64url_encode(tag)
        )))
    }

    async fn read(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        match self.verify(token_id.as_str())? {
            Some(inner) => self.delegate.read(ctx, &TokenId::new(inner)).await,
            None => {
                tracing::debug!(backend = self.backend(), "rejected token with bad tag");
                Ok(None)
            }
        }
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<()> {
        if !self.delegate.guarantees().revocable {
            return Err(TesseraError::unsupported("revoke", self.delegate.backend()));
        }
        match self.verify(token_id.as_str())? {
            Some(inner) => self.delegate.revoke(ctx, &TokenId::new(inner)).await,
            // A forged identifier names no server-side state.
            None => Ok(()),
        }
    }
}

impl<S: TokenStore> AuthenticatedTokenStore for HmacTokenStore<S> {}
impl<S: ConfidentialTokenStore> ConfidentialTokenStore for HmacTokenStore<S> {}
