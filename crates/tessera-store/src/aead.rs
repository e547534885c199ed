//! AEAD confidentiality combinator.
//!
//! Encrypts the delegate's identifier with XChaCha20-Poly1305 under a fresh
//! random 192-bit nonce. The new identifier is
//! `base64url(nonce || ciphertext || tag)`. Decryption failures read as
//! "no token".

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use tessera_core::encoding::{base64url_decode, base64url_encode, random_bytes};
use tessera_core::{
    AuthenticatedTokenStore, ConfidentialTokenStore, Guarantees, RequestContext, Result,
    SecretKey, TesseraError, Token, TokenId, TokenStore,
};
use zeroize::Zeroizing;

/// XChaCha20 nonce length
const NONCE_LEN: usize = 24;
/// Poly1305 tag length
const TAG_LEN: usize = 16;

/// Encrypts a delegate's identifiers
#[derive(Debug)]
pub struct EncryptedTokenStore<S> {
    delegate: S,
    key: SecretKey,
}

impl<S: TokenStore> EncryptedTokenStore<S> {
    /// Wrap `delegate`, encrypting under `key`
    pub fn new(delegate: S, key: SecretKey) -> Self {
        Self { delegate, key }
    }

    /// Wrapped store
    pub fn delegate(&self) -> &S {
        &self.delegate
    }

    fn cipher(&self) -> Result<XChaCha20Poly1305> {
        let key = Zeroizing::new(self.key.key_256()?);
        Ok(XChaCha20Poly1305::new((&*key).into()))
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let nonce_bytes = random_bytes::<NONCE_LEN>();
        let ciphertext = self
            .cipher()?
            .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| TesseraError::crypto(format!("Encryption failed: {e}")))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(base64url_encode(envelope))
    }

    fn open(&self, token_id: &str) -> Option<String> {
        let envelope = base64url_decode(token_id)?;
        if envelope.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        let (nonce, ciphertext) = envelope.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .ok()?
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}

#[async_trait]
impl<S: TokenStore> TokenStore for EncryptedTokenStore<S> {
    fn backend(&self) -> &'static str {
        "aead"
    }

    fn guarantees(&self) -> Guarantees {
        self.delegate
            .guarantees()
            .with_confidential()
            .with_authenticated()
    }

    async fn create(&self, ctx: &RequestContext, token: Token) -> Result<TokenId> {
        let inner = self.delegate.create(ctx, token).await?;
        Ok(TokenId::new(self.seal(inner.as_str().as_bytes())?))
    }

    async fn read(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        match self.open(token_id.as_str()) {
            Some(inner) => self.delegate.read(ctx, &TokenId::new(inner)).await,
            None => {
                tracing::debug!(backend = self.backend(), "rejected undecryptable token");
                Ok(None)
            }
        }
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<()> {
        if !self.delegate.guarantees().revocable {
            return Err(TesseraError::unsupported("revoke", self.delegate.backend()));
        }
        match self.open(token_id.as_str()) {
            Some(inner) => self.delegate.revoke(ctx, &TokenId::new(inner)).await,
            None => Ok(()),
        }
    }
}

impl<S: TokenStore> ConfidentialTokenStore for EncryptedTokenStore<S> {}
impl<S: TokenStore> AuthenticatedTokenStore for EncryptedTokenStore<S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DatabaseTokenStore, JsonTokenStore};
    use chrono::Duration;
    use tessera_core::{attrs, Clock, ManualClock};

    fn ctx() -> RequestContext {
        RequestContext::new("POST", "/sessions")
    }

    #[tokio::test]
    async fn test_hides_json_contents() {
        let clock = ManualClock::starting_now();
        let store =
            EncryptedTokenStore::new(JsonTokenStore::new(clock.clone()), SecretKey::generate());
        let token = Token::new(clock.now() + Duration::minutes(5), "alice")
            .with_attribute(attrs::SCOPE, "read");
        let id = store.create(&ctx(), token).await.unwrap();

        let raw = base64url_decode(id.as_str()).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("alice"));

        let read = store.read(&ctx(), &id).await.unwrap().unwrap();
        assert_eq!(read.subject(), Some("alice"));
        assert_eq!(read.attribute(attrs::SCOPE), Some("read"));
    }

    #[tokio::test]
    async fn test_nonces_are_fresh() {
        let clock = ManualClock::starting_now();
        let store =
            EncryptedTokenStore::new(JsonTokenStore::new(clock.clone()), SecretKey::generate());
        let token = Token::new(clock.now() + Duration::minutes(5), "alice");
        let a = store.create(&ctx(), token.clone()).await.unwrap();
        let b = store.create(&ctx(), token).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_wrong_key_and_short_envelopes_read_as_none() {
        let clock = ManualClock::starting_now();
        let store =
            EncryptedTokenStore::new(JsonTokenStore::new(clock.clone()), SecretKey::generate());
        let other =
            EncryptedTokenStore::new(JsonTokenStore::new(clock.clone()), SecretKey::generate());
        let id = store
            .create(&ctx(), Token::new(clock.now() + Duration::minutes(5), "alice"))
            .await
            .unwrap();

        assert!(other.read(&ctx(), &id).await.unwrap().is_none());
        let short = TokenId::new(base64url_encode([0u8; NONCE_LEN + TAG_LEN - 1]));
        assert!(store.read(&ctx(), &short).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_forwards_to_stateful_delegate() {
        let clock = ManualClock::starting_now();
        let store = EncryptedTokenStore::new(
            DatabaseTokenStore::in_memory(clock.clone()).unwrap(),
            SecretKey::generate(),
        );
        let id = store
            .create(&ctx(), Token::new(clock.now() + Duration::minutes(5), "alice"))
            .await
            .unwrap();
        store.revoke(&ctx(), &id).await.unwrap();
        assert!(store.read(&ctx(), &id).await.unwrap().is_none());
        assert_eq!(store.delegate().table().len().unwrap(), 0);
    }
}
