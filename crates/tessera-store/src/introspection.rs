//! OAuth2 token introspection store (RFC 7662).
//!
//! Validation is delegated to an authorization server. Tokens are minted
//! and revoked there, so `create` and `revoke` are unsupported; an explicit
//! RFC 7009 revocation call is available as [`IntrospectionTokenStore::revoke_remote`].
//!
//! Network failures and timeouts are errors, never "no token" and never a
//! pass: callers must deny.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tessera_core::config::IntrospectionConfig;
use tessera_core::{
    attrs, AuthenticatedTokenStore, ConfidentialTokenStore, Guarantees, RequestContext, Result,
    SharedClock, TesseraError, Token, TokenId, TokenStore,
};
use url::{form_urlencoded, Url};

/// Longest identifier sent to the authorization server
const MAX_TOKEN_LEN: usize = 1024;

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
}

/// Printable ASCII, 1 to 1024 characters
fn is_well_formed(token_id: &str) -> bool {
    !token_id.is_empty()
        && token_id.len() <= MAX_TOKEN_LEN
        && token_id.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

/// Form-url-encode a client credential before Basic encoding (RFC 6749 §2.3.1)
fn encode_credential(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Token validation by remote introspection
pub struct IntrospectionTokenStore {
    client: reqwest::Client,
    endpoint: Url,
    revocation_endpoint: Option<Url>,
    client_id: String,
    client_secret: String,
    clock: SharedClock,
}

impl IntrospectionTokenStore {
    /// Store calling `endpoint` with the given client credentials
    pub fn new(
        endpoint: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
        clock: SharedClock,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TesseraError::config(format!("invalid introspection endpoint: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TesseraError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            revocation_endpoint: None,
            client_id: encode_credential(client_id),
            client_secret: encode_credential(client_secret),
            clock,
        })
    }

    /// Store built from the `[introspection]` section
    pub fn from_config(config: &IntrospectionConfig, clock: SharedClock) -> Result<Self> {
        let store = Self::new(
            &config.endpoint,
            &config.client_id,
            &config.client_secret,
            config.timeout(),
            clock,
        )?;
        match &config.revocation_endpoint {
            Some(endpoint) => store.with_revocation_endpoint(endpoint),
            None => Ok(store),
        }
    }

    /// Enable [`Self::revoke_remote`] against `endpoint`
    pub fn with_revocation_endpoint(mut self, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TesseraError::config(format!("invalid revocation endpoint: {e}")))?;
        self.revocation_endpoint = Some(endpoint);
        Ok(self)
    }

    async fn post_token(&self, url: &Url, token_id: &str) -> Result<reqwest::Response> {
        self.client
            .post(url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token_id), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(endpoint = %url, error = %e, "authorization server call failed");
                TesseraError::network(format!("call to {url} failed: {e}"))
            })
    }

    fn token_from_response(&self, response: IntrospectionResponse) -> Option<Token> {
        if !response.active {
            return None;
        }
        let expiry = Utc.timestamp_opt(response.exp?, 0).single()?;
        let mut token =
            Token::new(expiry, response.sub?).with_attribute(attrs::SCOPE, response.scope?);
        if let Some(client_id) = response.client_id {
            token = token.with_attribute(attrs::CLIENT_ID, client_id);
        }
        token.is_valid_at(self.clock.now()).then_some(token)
    }

    /// Revoke a token at the authorization server (RFC 7009)
    pub async fn revoke_remote(&self, token_id: &TokenId) -> Result<()> {
        let Some(endpoint) = &self.revocation_endpoint else {
            return Err(TesseraError::unsupported("revoke_remote", self.backend()));
        };
        if !is_well_formed(token_id.as_str()) {
            return Err(TesseraError::invalid("token is not printable ASCII"));
        }
        let response = self.post_token(endpoint, token_id.as_str()).await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(TesseraError::network(format!(
                "revocation endpoint returned {status}"
            ))),
        }
    }
}

impl fmt::Debug for IntrospectionTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrospectionTokenStore")
            .field("endpoint", &self.endpoint.as_str())
            .field(
                "revocation_endpoint",
                &self.revocation_endpoint.as_ref().map(Url::as_str),
            )
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenStore for IntrospectionTokenStore {
    fn backend(&self) -> &'static str {
        "introspection"
    }

    fn guarantees(&self) -> Guarantees {
        // Tokens are opaque to us and verified by the issuer on every call.
        Guarantees::NONE.with_confidential().with_authenticated()
    }

    async fn create(&self, _ctx: &RequestContext, _token: Token) -> Result<TokenId> {
        Err(TesseraError::unsupported("create", self.backend()))
    }

    async fn read(&self, _ctx: &RequestContext, token_id: &TokenId) -> Result<Option<Token>> {
        if !is_well_formed(token_id.as_str()) {
            tracing::debug!(backend = self.backend(), "rejected malformed token locally");
            return Ok(None);
        }

        let response = self.post_token(&self.endpoint, token_id.as_str()).await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(%status, "introspection endpoint rejected the request");
            return Ok(None);
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| TesseraError::network(format!("reading introspection response: {e}")))?;

        let token = serde_json::from_slice::<IntrospectionResponse>(&body)
            .ok()
            .and_then(|response| self.token_from_response(response));
        if token.is_none() {
            tracing::debug!(backend = self.backend(), "token inactive or incomplete");
        }
        Ok(token)
    }

    async fn revoke(&self, _ctx: &RequestContext, _token_id: &TokenId) -> Result<()> {
        Err(TesseraError::unsupported("revoke", self.backend()))
    }
}

impl ConfidentialTokenStore for IntrospectionTokenStore {}
impl AuthenticatedTokenStore for IntrospectionTokenStore {}
