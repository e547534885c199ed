//! Store chains assembled from configuration.
//!
//! The chain's guarantees are checked once, here. A chain that passes the
//! secure check is handed out as [`SecureStore`], which carries the
//! [`SecureTokenStore`](tessera_core::SecureTokenStore) markers so it can
//! be given to APIs that demand them.

use crate::{
    DatabaseTokenStore, EncryptedJwtTokenStore, EncryptedTokenStore, HmacTokenStore,
    IntrospectionTokenStore, JsonTokenStore, JweKey, JwsKey, JwtAccessTokenStore, SessionRegistry,
    SessionTokenStore, SignedJwtTokenStore,
};
use async_trait::async_trait;
use std::fmt;
use tessera_core::config::{BackendKind, JwtAlgorithm, KeySource, WrapperKind};
use tessera_core::{
    AuthenticatedTokenStore, ConfidentialTokenStore, ConfigSource, Guarantees, RequestContext,
    Result, SecretKey, SharedClock, TesseraConfig, TesseraError, Token, TokenId, TokenStore,
};

/// A configured store chain
pub struct ComposedStore {
    inner: Box<dyn TokenStore>,
    chain: String,
}

impl fmt::Debug for ComposedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedStore")
            .field("chain", &self.chain)
            .field("guarantees", &self.inner.guarantees())
            .finish()
    }
}

impl ComposedStore {
    /// Human readable chain, innermost first (`database+hmac`)
    pub fn chain(&self) -> &str {
        &self.chain
    }

    /// Check the chain is confidential and authenticated
    pub fn into_secure(self) -> Result<SecureStore> {
        let guarantees = self.inner.guarantees();
        if !guarantees.is_secure() {
            return Err(TesseraError::config(format!(
                "store chain {} is {guarantees}, but confidential+authenticated is required",
                self.chain
            )));
        }
        Ok(SecureStore(self))
    }
}

#[async_trait]
impl TokenStore for ComposedStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    fn guarantees(&self) -> Guarantees {
        self.inner.guarantees()
    }

    async fn create(&self, ctx: &RequestContext, token: Token) -> Result<TokenId> {
        self.inner.create(ctx, token).await
    }

    async fn read(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        self.inner.read(ctx, token_id).await
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<()> {
        self.inner.revoke(ctx, token_id).await
    }
}

/// A chain verified to be confidential and authenticated
#[derive(Debug)]
pub struct SecureStore(ComposedStore);

impl SecureStore {
    /// Human readable chain
    pub fn chain(&self) -> &str {
        self.0.chain()
    }
}

#[async_trait]
impl TokenStore for SecureStore {
    fn backend(&self) -> &'static str {
        self.0.backend()
    }

    fn guarantees(&self) -> Guarantees {
        self.0.guarantees()
    }

    async fn create(&self, ctx: &RequestContext, token: Token) -> Result<TokenId> {
        self.0.create(ctx, token).await
    }

    async fn read(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        self.0.read(ctx, token_id).await
    }

    async fn revoke(&self, ctx: &RequestContext, token_id: &TokenId) -> Result<()> {
        self.0.revoke(ctx, token_id).await
    }
}

impl ConfidentialTokenStore for SecureStore {}
impl AuthenticatedTokenStore for SecureStore {}

fn resolve_key(source: &Option<KeySource>, name: &str) -> Result<SecretKey> {
    source
        .as_ref()
        .ok_or_else(|| TesseraError::config(format!("keys.{name} is required")))?
        .resolve()
}

fn open_database(config: &TesseraConfig, clock: SharedClock) -> Result<DatabaseTokenStore> {
    let store = DatabaseTokenStore::open(&config.database.path, clock)?;
    if tokio::runtime::Handle::try_current().is_ok() {
        store.with_sweeper(config.database.sweep_interval())
    } else {
        tracing::debug!("no tokio runtime, expiry sweeper not started");
        Ok(store)
    }
}

fn open_sessions(
    config: &TesseraConfig,
    ttl: chrono::Duration,
    clock: SharedClock,
) -> Result<SessionTokenStore> {
    let store = SessionTokenStore::new(SessionRegistry::new(ttl, clock.clone()), clock);
    if tokio::runtime::Handle::try_current().is_ok() {
        store.with_sweeper(config.session.sweep_interval())
    } else {
        tracing::debug!("no tokio runtime, session sweeper not started");
        Ok(store)
    }
}

fn signing_key(config: &TesseraConfig) -> Result<JwsKey> {
    match config.jwt.algorithm {
        JwtAlgorithm::Hs256 => Ok(JwsKey::Hs256(resolve_key(&config.keys.jwt_hmac, "jwt_hmac")?)),
        JwtAlgorithm::EdDsa => {
            JwsKey::ed25519_from_seed(&resolve_key(&config.keys.jwt_ed25519, "jwt_ed25519")?)
        }
    }
}

fn verification_key(config: &TesseraConfig) -> Result<JwsKey> {
    match config.jwt.algorithm {
        JwtAlgorithm::Hs256 => Ok(JwsKey::Hs256(resolve_key(&config.keys.jwt_hmac, "jwt_hmac")?)),
        JwtAlgorithm::EdDsa => {
            let public = config
                .keys
                .jwt_ed25519_public
                .as_deref()
                .ok_or_else(|| TesseraError::config("keys.jwt_ed25519_public is required"))?;
            JwsKey::ed25519_public_from_base64url(public)
        }
    }
}

fn backend(config: &TesseraConfig, clock: SharedClock) -> Result<Box<dyn TokenStore>> {
    let audience = config.jwt.audience.clone();
    let store: Box<dyn TokenStore> = match config.store.backend {
        BackendKind::Database => Box::new(open_database(config, clock)?),
        BackendKind::Json => Box::new(JsonTokenStore::new(clock)),
        BackendKind::Session => {
            let ttl = chrono::Duration::seconds(
                i64::try_from(config.session.ttl_secs)
                    .map_err(|_| TesseraError::config("session.ttl_secs is too large"))?,
            );
            Box::new(open_sessions(config, ttl, clock)?)
        }
        BackendKind::SignedJwt => {
            Box::new(SignedJwtTokenStore::new(signing_key(config)?, audience, clock))
        }
        BackendKind::EncryptedJwt => Box::new(EncryptedJwtTokenStore::new(
            JweKey::new(resolve_key(&config.keys.jwe, "jwe")?),
            audience,
            clock,
        )),
        BackendKind::EncryptedJwtAllowList => Box::new(EncryptedJwtTokenStore::with_allow_list(
            JweKey::new(resolve_key(&config.keys.jwe, "jwe")?),
            audience,
            open_database(config, clock.clone())?,
            clock,
        )),
        BackendKind::Introspection => {
            let section = config
                .introspection
                .as_ref()
                .ok_or_else(|| TesseraError::config("[introspection] is required"))?;
            Box::new(IntrospectionTokenStore::from_config(section, clock)?)
        }
        BackendKind::JwtAccessToken => {
            let issuer = config
                .jwt
                .issuer
                .clone()
                .ok_or_else(|| TesseraError::config("jwt.issuer is required"))?;
            Box::new(JwtAccessTokenStore::new(
                verification_key(config)?,
                issuer,
                audience,
                clock,
            ))
        }
    };
    Ok(store)
}

/// Build the configured chain
///
/// When `store.require_secure` is set the chain must be confidential and
/// authenticated; otherwise it is returned as configured.
pub fn compose(config: &TesseraConfig, clock: SharedClock) -> Result<ComposedStore> {
    config.validate()?;

    let mut store = backend(config, clock)?;
    let mut chain = vec![store.backend()];
    for wrapper in &config.store.wrappers {
        store = match wrapper {
            WrapperKind::Hmac => {
                Box::new(HmacTokenStore::new(store, resolve_key(&config.keys.hmac, "hmac")?))
            }
            WrapperKind::Aead => {
                Box::new(EncryptedTokenStore::new(store, resolve_key(&config.keys.aead, "aead")?))
            }
        };
        chain.push(store.backend());
    }

    let composed = ComposedStore {
        inner: store,
        chain: chain.join("+"),
    };
    if config.store.require_secure && !composed.guarantees().is_secure() {
        return Err(TesseraError::config(format!(
            "store chain {} is {}, but confidential+authenticated is required",
            composed.chain,
            composed.guarantees()
        )));
    }
    tracing::info!(
        chain = composed.chain(),
        guarantees = %composed.guarantees(),
        "token store composed"
    );
    Ok(composed)
}

/// Build the configured chain and require it to be secure
pub fn compose_secure(config: &TesseraConfig, clock: SharedClock) -> Result<SecureStore> {
    compose(config, clock)?.into_secure()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::config::StoreConfig;
    use tessera_core::ManualClock;

    fn inline_key() -> Option<KeySource> {
        Some(KeySource::Inline(SecretKey::generate().to_base64url()))
    }

    fn config(backend: BackendKind, wrappers: Vec<WrapperKind>) -> TesseraConfig {
        let mut config = TesseraConfig::default();
        config.store = StoreConfig {
            backend,
            wrappers,
            require_secure: true,
        };
        config.keys.hmac = inline_key();
        config.keys.aead = inline_key();
        config.keys.jwt_hmac = inline_key();
        config.keys.jwe = inline_key();
        config
    }

    #[test]
    fn test_default_chain_is_secure() {
        let mut config = TesseraConfig::default();
        config.keys.hmac = inline_key();
        let store = compose_secure(&config, ManualClock::starting_now()).unwrap();
        assert_eq!(store.chain(), "database+hmac");
        assert!(store.guarantees().revocable);
    }

    #[test]
    fn test_insecure_chains_are_rejected_at_composition() {
        for (backend, wrappers) in [
            (BackendKind::Json, vec![]),
            (BackendKind::Json, vec![WrapperKind::Hmac]),
            (BackendKind::Database, vec![]),
            (BackendKind::SignedJwt, vec![]),
        ] {
            let err =
                compose(&config(backend, wrappers), ManualClock::starting_now()).unwrap_err();
            assert!(matches!(err, TesseraError::Config { .. }));
        }
    }

    #[tokio::test]
    async fn test_session_backend_starts_its_sweeper() {
        let mut config = config(BackendKind::Session, vec![WrapperKind::Hmac]);
        config.session.sweep_interval_secs = 5;
        let store =
            open_sessions(&config, chrono::Duration::minutes(30), ManualClock::starting_now())
                .unwrap();
        let sweeper = store.sweeper().unwrap();
        assert!(sweeper.is_running());
        assert_eq!(sweeper.interval().as_secs(), 5);

        let without_runtime = std::thread::spawn(move || {
            open_sessions(&config, chrono::Duration::minutes(30), ManualClock::starting_now())
                .unwrap()
                .sweeper()
                .is_none()
        });
        assert!(without_runtime.join().unwrap());
    }

    #[test]
    fn test_insecure_chain_allowed_when_not_required() {
        let mut config = config(BackendKind::Json, vec![WrapperKind::Hmac]);
        config.store.require_secure = false;
        let store = compose(&config, ManualClock::starting_now()).unwrap();
        assert_eq!(store.chain(), "json+hmac");
        assert!(store.into_secure().is_err());
    }

    #[test]
    fn test_wrapped_chains_are_secure() {
        for (backend, wrappers, chain) in [
            (BackendKind::Json, vec![WrapperKind::Aead], "json+aead"),
            (
                BackendKind::SignedJwt,
                vec![WrapperKind::Aead],
                "signed_jwt+aead",
            ),
            (BackendKind::EncryptedJwt, vec![], "encrypted_jwt"),
            (
                BackendKind::EncryptedJwtAllowList,
                vec![WrapperKind::Hmac],
                "encrypted_jwt_allow_list+hmac",
            ),
            (
                BackendKind::Session,
                vec![WrapperKind::Hmac, WrapperKind::Aead],
                "session+hmac+aead",
            ),
        ] {
            let store =
                compose_secure(&config(backend, wrappers), ManualClock::starting_now()).unwrap();
            assert_eq!(store.chain(), chain);
        }
    }
}
