//! Self-contained encrypted JWT store.
//!
//! Without an allow-list the store is stateless and cannot revoke. With
//! one, every token also gets a minimal row in a [`DatabaseTokenStore`]
//! whose identifier travels inside the token as `jti`; reading requires the
//! row to still exist and revoking deletes it.

use crate::claims::TokenClaims;
use crate::database::DatabaseTokenStore;
use crate::jose::JweKey;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tessera_core::{
    AuthenticatedTokenStore, ConfidentialTokenStore, Guarantees, RequestContext, Result,
    SharedClock, TesseraError, Token, TokenId, TokenStore,
};

/// Encrypted JWT, optionally backed by an allow-list
#[derive(Debug)]
pub struct EncryptedJwtTokenStore {
    key: JweKey,
    audience: String,
    clock: SharedClock,
    allow_list: Option<DatabaseTokenStore>,
}

impl EncryptedJwtTokenStore {
    /// Stateless store
    pub fn new(key: JweKey, audience: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            key,
            audience: audience.into(),
            clock,
            allow_list: None,
        }
    }

    /// Hybrid store recording each token in `allow_list`
    pub fn with_allow_list(
        key: JweKey,
        audience: impl Into<String>,
        allow_list: DatabaseTokenStore,
        clock: SharedClock,
    ) -> Self {
        Self {
            allow_list: Some(allow_list),
            ..Self::new(key, audience, clock)
        }
    }

    /// The allow-list, for hybrid stores
    pub fn allow_list(&self) -> Option<&DatabaseTokenStore> {
        self.allow_list.as_ref()
    }

    fn decrypt(&self, token_id: &TokenId) -> Option<TokenClaims> {
        self.key
            .decrypt(token_id.as_str())
            .and_then(|payload| TokenClaims::parse(&payload))
    }
}

#[async_trait]
impl TokenStore for EncryptedJwtTokenStore {
    fn backend(&self) -> &'static str {
        if self.allow_list.is_some() {
            "encrypted_jwt_allow_list"
        } else {
            "encrypted_jwt"
        }
    }

    fn guarantees(&self) -> Guarantees {
        let guarantees = Guarantees::NONE.with_confidential().with_authenticated();
        if self.allow_list.is_some() {
            guarantees.with_revocable()
        } else {
            guarantees
        }
    }

    async fn create(&self, ctx: &RequestContext, token: Token) -> Result<TokenId> {
        let jti = match &self.allow_list {
            Some(allow_list) => {
                // Only subject and expiry go into the row; attributes stay in the token.
                let entry = Token::from_parts(
                    token.expiry(),
                    token.subject().map(str::to_string),
                    BTreeMap::new(),
                );
                Some(allow_list.create(ctx, entry).await?.into_string())
            }
            None => None,
        };
        let row = jti.clone().map(TokenId::new);
        let claims = TokenClaims::new(token, &self.audience, jti, self.clock.now());
        let sealed = serde_json::to_vec(&claims)
            .map_err(TesseraError::from)
            .and_then(|payload| self.key.encrypt(&payload));
        match sealed {
            Ok(jwe) => Ok(TokenId::new(jwe)),
            Err(err) => {
                // No token carries this jti; drop its row.
                if let (Some(allow_list), Some(row)) = (&self.allow_list, row) {
                    if let Err(cleanup) = allow_list.revoke(ctx, &row).await {
                        tracing::warn!(error = %cleanup, "failed to drop allow-list row");
                    }
                }
                Err(err)
            }
        }
    }

    async fn read(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        let Some(claims) = self.decrypt(token_id) else {
            tracing::debug!(backend = self.backend(), "rejected undecryptable token");
            return Ok(None);
        };

        if let Some(allow_list) = &self.allow_list {
            let Some(jti) = claims.jti.as_deref() else {
                return Ok(None);
            };
            if allow_list.read(ctx, &TokenId::new(jti)).await?.is_none() {
                tracing::debug!(backend = self.backend(), "token not on allow-list");
                return Ok(None);
            }
        }

        Ok(claims.into_token(&self.audience, self.clock.now()))
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<()> {
        let Some(allow_list) = &self.allow_list else {
            return Err(TesseraError::unsupported("revoke", self.backend()));
        };
        let jti = self
            .decrypt(token_id)
            .and_then(|claims| claims.jti)
            .ok_or_else(|| TesseraError::invalid("Invalid token"))?;
        allow_list.revoke(ctx, &TokenId::new(jti)).await
    }
}

impl ConfidentialTokenStore for EncryptedJwtTokenStore {}
impl AuthenticatedTokenStore for EncryptedJwtTokenStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tessera_core::{attrs, Clock, ManualClock, SecretKey};
    use zeroize::Zeroize;

    const AUD: &str = "https://localhost:4567";

    fn ctx() -> RequestContext {
        RequestContext::new("POST", "/sessions")
    }

    #[tokio::test]
    async fn test_attributes_survive_byte_for_byte() {
        let clock = ManualClock::starting_now();
        let store = EncryptedJwtTokenStore::new(
            JweKey::new(SecretKey::generate()),
            AUD,
            clock.clone(),
        );
        let token = Token::new(clock.now() + Duration::minutes(10), "alice")
            .with_attribute(attrs::SCOPE, "read write")
            .with_attribute("exp", "not the expiry")
            .with_attribute("note", "ünïcödé \"quoted\"");
        let id = store.create(&ctx(), token.clone()).await.unwrap();
        assert_eq!(id.as_str().split('.').count(), 5);

        let read = store.read(&ctx(), &id).await.unwrap().unwrap();
        assert_eq!(read.attributes(), token.attributes());
        assert_eq!(read.subject(), Some("alice"));
    }

    #[tokio::test]
    async fn test_stateless_revoke_is_unsupported() {
        let clock = ManualClock::starting_now();
        let store = EncryptedJwtTokenStore::new(
            JweKey::new(SecretKey::generate()),
            AUD,
            clock.clone(),
        );
        let id = store
            .create(&ctx(), Token::new(clock.now() + Duration::minutes(1), "alice"))
            .await
            .unwrap();
        assert!(store.revoke(&ctx(), &id).await.unwrap_err().is_unsupported());
        assert!(store.read(&ctx(), &id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_allow_list_revocation() {
        let clock = ManualClock::starting_now();
        let store = EncryptedJwtTokenStore::with_allow_list(
            JweKey::new(SecretKey::generate()),
            AUD,
            DatabaseTokenStore::in_memory(clock.clone()).unwrap(),
            clock.clone(),
        );
        assert!(store.guarantees().revocable);

        let token = Token::new(clock.now() + Duration::minutes(10), "alice")
            .with_attribute(attrs::SCOPE, "read");
        let id = store.create(&ctx(), token).await.unwrap();
        assert!(store.read(&ctx(), &id).await.unwrap().is_some());

        let row = store.allow_list().unwrap().table().len().unwrap();
        assert_eq!(row, 1);

        store.revoke(&ctx(), &id).await.unwrap();
        assert!(store.read(&ctx(), &id).await.unwrap().is_none());
        assert_eq!(store.allow_list().unwrap().table().len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_encryption_leaves_no_allow_list_row() {
        let clock = ManualClock::starting_now();
        let mut secret = SecretKey::generate();
        secret.zeroize();
        let store = EncryptedJwtTokenStore::with_allow_list(
            JweKey::new(secret),
            AUD,
            DatabaseTokenStore::in_memory(clock.clone()).unwrap(),
            clock.clone(),
        );
        let err = store
            .create(&ctx(), Token::new(clock.now() + Duration::minutes(10), "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, TesseraError::Crypto { .. }));
        assert_eq!(store.allow_list().unwrap().table().len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_allow_list_rejects_invalid_token_on_revoke() {
        let clock = ManualClock::starting_now();
        let store = EncryptedJwtTokenStore::with_allow_list(
            JweKey::new(SecretKey::generate()),
            AUD,
            DatabaseTokenStore::in_memory(clock.clone()).unwrap(),
            clock,
        );
        let err = store
            .revoke(&ctx(), &TokenId::new("a..b.c.d"))
            .await
            .unwrap_err();
        assert!(matches!(err, TesseraError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_token_from_stateless_store_is_not_on_allow_list() {
        let clock = ManualClock::starting_now();
        let secret = SecretKey::generate();
        let stateless =
            EncryptedJwtTokenStore::new(JweKey::new(secret.clone()), AUD, clock.clone());
        let hybrid = EncryptedJwtTokenStore::with_allow_list(
            JweKey::new(secret),
            AUD,
            DatabaseTokenStore::in_memory(clock.clone()).unwrap(),
            clock.clone(),
        );
        let id = stateless
            .create(&ctx(), Token::new(clock.now() + Duration::minutes(1), "alice"))
            .await
            .unwrap();
        assert!(hybrid.read(&ctx(), &id).await.unwrap().is_none());
    }
}
