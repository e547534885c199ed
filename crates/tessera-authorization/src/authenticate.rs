//! Bearer-token login, logout and per-request authentication

use crate::rejection::{Rejection, Verdict};
use chrono::Duration;
use std::collections::BTreeMap;
use tessera_core::config::AuthConfig;
use tessera_core::{RequestContext, Result, SharedClock, TesseraError, Token, TokenId, TokenStore};

/// Lifetime of tokens minted at login unless configured otherwise
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 600;

const BEARER_PREFIX: &str = "bearer ";

/// Mints tokens at login and turns presented tokens back into a subject
#[derive(Debug)]
pub struct TokenAuthenticator<S> {
    store: S,
    clock: SharedClock,
    token_ttl: Duration,
    legacy_header: Option<String>,
}

impl<S: TokenStore> TokenAuthenticator<S> {
    /// Authenticator over `store` with the default token lifetime
    pub fn new(store: S, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            token_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            legacy_header: None,
        }
    }

    /// Authenticator configured from `[auth]`
    pub fn from_config(store: S, config: &AuthConfig, clock: SharedClock) -> Result<Self> {
        let secs = i64::try_from(config.token_ttl_secs)
            .map_err(|_| TesseraError::config("auth.token_ttl_secs is too large"))?;
        let mut authenticator = Self::new(store, clock).with_token_ttl(Duration::seconds(secs));
        if let Some(header) = &config.legacy_header {
            authenticator = authenticator.with_legacy_header(header.clone());
        }
        Ok(authenticator)
    }

    /// Lifetime of tokens minted by [`Self::login`]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Also accept the token from `header` (for example `X-CSRF-Token`)
    pub fn with_legacy_header(mut self, header: impl Into<String>) -> Self {
        self.legacy_header = Some(header.into());
        self
    }

    /// Backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mint a token for `subject`
    ///
    /// The caller has already authenticated the subject some other way
    /// (password, client certificate).
    pub async fn login(
        &self,
        ctx: &RequestContext,
        subject: &str,
        ttl: Option<Duration>,
        attributes: BTreeMap<String, String>,
    ) -> Result<TokenId> {
        let expiry = self.clock.now() + ttl.unwrap_or(self.token_ttl);
        let token = Token::from_parts(expiry, Some(subject.to_string()), attributes);
        let token_id = self.store.create(ctx, token).await?;
        tracing::debug!(subject, backend = self.store.backend(), "token issued");
        Ok(token_id)
    }

    /// Revoke the token presented with the request
    pub async fn logout(&self, ctx: &RequestContext) -> Result<()> {
        let token_id = self
            .presented_token(ctx)
            .ok_or_else(|| TesseraError::invalid("no token presented"))?;
        self.store.revoke(ctx, &token_id).await
    }

    /// Token identifier carried by the request, if any
    pub fn presented_token(&self, ctx: &RequestContext) -> Option<TokenId> {
        let bearer = ctx.header("Authorization").and_then(|value| {
            let prefix = value.get(..BEARER_PREFIX.len())?;
            prefix
                .eq_ignore_ascii_case(BEARER_PREFIX)
                .then(|| value[BEARER_PREFIX.len()..].trim())
        });
        let legacy = || {
            self.legacy_header
                .as_deref()
                .and_then(|header| ctx.header(header))
        };
        bearer
            .or_else(legacy)
            .filter(|id| !id.is_empty())
            .map(TokenId::from)
    }

    /// Validate the presented token and record it on the request
    ///
    /// Requests without a token are left alone. A token that does not
    /// validate marks the request so [`require_authentication`] can answer
    /// with `invalid_token`. Store failures are returned and the caller
    /// must deny.
    pub async fn authenticate(&self, ctx: &mut RequestContext) -> Result<()> {
        let Some(token_id) = self.presented_token(ctx) else {
            return Ok(());
        };
        match self.store.read(ctx, &token_id).await? {
            Some(token) if token.is_valid_at(self.clock.now()) => {
                ctx.set_token(token);
            }
            _ => {
                tracing::debug!(backend = self.store.backend(), "presented token rejected");
                ctx.mark_token_rejected();
            }
        }
        Ok(())
    }
}

/// Halt unauthenticated requests with 401
pub fn require_authentication(ctx: &RequestContext) -> Verdict {
    if ctx.subject().is_some() {
        Ok(())
    } else if ctx.token_rejected() {
        Err(Rejection::invalid_token())
    } else {
        Err(Rejection::unauthenticated())
    }
}
