//! Verifier for JWT access tokens minted by an external authorization server.
//!
//! Tokens are checked locally against a configured verification key,
//! issuer and audience, so no introspection round trip is needed. Tessera
//! never mints these, so `create` and `revoke` are unsupported.

use crate::claims::Audience;
use crate::jose::JwsKey;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tessera_core::{
    attrs, AuthenticatedTokenStore, Guarantees, RequestContext, Result, SharedClock, TesseraError,
    Token, TokenId, TokenStore,
};

/// `scope` as a space separated string or an array of strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    Joined(String),
    List(Vec<String>),
}

impl ScopeClaim {
    fn joined(self) -> String {
        match self {
            ScopeClaim::Joined(scope) => scope,
            ScopeClaim::List(scopes) => scopes.join(" "),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    iss: String,
    aud: Audience,
    exp: i64,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    scope: Option<ScopeClaim>,
    #[serde(default)]
    client_id: Option<String>,
}

/// Validates externally issued JWT access tokens
#[derive(Debug)]
pub struct JwtAccessTokenStore {
    key: JwsKey,
    issuer: String,
    audience: String,
    clock: SharedClock,
}

impl JwtAccessTokenStore {
    /// Accept tokens signed by `key`, issued by `issuer` for `audience`
    pub fn new(
        key: JwsKey,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        clock: SharedClock,
    ) -> Self {
        Self {
            key,
            issuer: issuer.into(),
            audience: audience.into(),
            clock,
        }
    }

    fn validate(&self, token_id: &str) -> Option<Token> {
        let payload = self.key.verify(token_id)?;
        let claims: AccessTokenClaims = serde_json::from_slice(&payload).ok()?;
        if claims.iss != self.issuer || !claims.aud.contains(&self.audience) {
            return None;
        }
        let expiry = Utc.timestamp_opt(claims.exp, 0).single()?;

        let mut token = Token::from_parts(expiry, claims.sub, Default::default());
        if let Some(scope) = claims.scope {
            token = token.with_attribute(attrs::SCOPE, scope.joined());
        }
        if let Some(client_id) = claims.client_id {
            token = token.with_attribute(attrs::CLIENT_ID, client_id);
        }
        token.is_valid_at(self.clock.now()).then_some(token)
    }
}

#[async_trait]
impl TokenStore for JwtAccessTokenStore {
    fn backend(&self) -> &'static str {
        "jwt_access_token"
    }

    fn guarantees(&self) -> Guarantees {
        Guarantees::NONE.with_authenticated()
    }

    async fn create(&self, _ctx: &RequestContext, _token: Token) -> Result<TokenId> {
        Err(TesseraError::unsupported("create", self.backend()))
    }

    async fn read(&self, _ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        let token = self.validate(token_id.as_str());
        if token.is_none() {
            tracing::debug!(backend = self.backend(), "rejected access token");
        }
        Ok(token)
    }

    async fn revoke(&self, _ctx: &RequestContext, _token_id: &TokenId) -> Result<()> {
        Err(TesseraError::unsupported("revoke", self.backend()))
    }
}

impl AuthenticatedTokenStore for JwtAccessTokenStore {}
