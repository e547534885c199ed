//! Capability URIs
//!
//! A capability is a subject-less token carrying a `path` and `perms`. The
//! identifier travels in the `access_token` query parameter (RFC 6750
//! §2.3). Whoever presents it gets exactly those permissions on exactly
//! that path.

use crate::permission::holds_all;
use chrono::Duration;
use tessera_core::config::ALL_PERMISSIONS;
use tessera_core::{
    attrs, RequestContext, Result, SecureTokenStore, SharedClock, TesseraError, Token, TokenId,
};
use url::form_urlencoded;

/// Query parameter carrying the capability token
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Issues and resolves capability URIs
///
/// Only a confidential and authenticated store is accepted: a capability
/// identifier is the whole authorization.
#[derive(Debug)]
pub struct CapabilityIssuer<S: SecureTokenStore> {
    store: S,
    clock: SharedClock,
}

impl<S: SecureTokenStore> CapabilityIssuer<S> {
    /// Issuer minting through `store`
    pub fn new(store: S, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mint a capability for `path` and return `path?access_token=<id>`
    pub async fn create_uri(
        &self,
        ctx: &RequestContext,
        path: &str,
        perms: &str,
        ttl: Duration,
    ) -> Result<String> {
        if !path.starts_with('/') || path.contains(['?', '#']) {
            return Err(TesseraError::invalid(format!(
                "capability path must be an absolute path without query: {path}"
            )));
        }
        if perms.is_empty() || !holds_all(ALL_PERMISSIONS, perms) {
            return Err(TesseraError::invalid(format!(
                "permission '{perms}' is not a combination of r, w and d"
            )));
        }

        let token = Token::unbound(self.clock.now() + ttl)
            .with_attribute(attrs::PATH, path)
            .with_attribute(attrs::PERMS, perms);
        let token_id = self.store.create(ctx, token).await?;
        tracing::info!(path, perms, backend = self.store.backend(), "capability issued");

        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair(ACCESS_TOKEN_PARAM, token_id.as_str())
            .finish();
        Ok(format!("{path}?{query}"))
    }

    /// Grant the permissions of a presented capability
    ///
    /// Does nothing unless the request carries a valid capability whose
    /// path equals the request path exactly.
    pub async fn lookup_permissions(&self, ctx: &mut RequestContext) -> Result<()> {
        let Some(token_id) = ctx.query_param(ACCESS_TOKEN_PARAM).map(TokenId::from) else {
            return Ok(());
        };
        let Some(token) = self.store.read(ctx, &token_id).await? else {
            return Ok(());
        };
        if !token.is_valid_at(self.clock.now()) {
            return Ok(());
        }
        match (token.attribute(attrs::PATH), token.attribute(attrs::PERMS)) {
            (Some(path), Some(perms)) if path == ctx.path() => ctx.set_perms(perms),
            _ => {
                tracing::debug!("capability presented for another path");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{ManualClock, SecretKey};
    use tessera_store::{DatabaseTokenStore, EncryptedTokenStore, HmacTokenStore};
    use url::Url;

    fn access_token(uri: &str) -> String {
        let url = Url::parse(&format!("https://api.example.com{uri}")).unwrap();
        url.query_pairs()
            .find(|(name, _)| name == ACCESS_TOKEN_PARAM)
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    fn request(method: &str, path: &str, token: &str) -> RequestContext {
        RequestContext::new(method, path).with_query(ACCESS_TOKEN_PARAM, token)
    }

    #[tokio::test]
    async fn test_exact_path_only() {
        let clock = ManualClock::starting_now();
        let store = EncryptedTokenStore::new(
            DatabaseTokenStore::in_memory(clock.clone()).unwrap(),
            SecretKey::generate(),
        );
        let issuer = CapabilityIssuer::new(store, clock);
        let uri = issuer
            .create_uri(
                &RequestContext::new("POST", "/spaces"),
                "/spaces/42",
                "rw",
                Duration::days(365),
            )
            .await
            .unwrap();
        assert!(uri.starts_with("/spaces/42?access_token="));
        let token = access_token(&uri);

        let mut ctx = request("GET", "/spaces/42", &token);
        issuer.lookup_permissions(&mut ctx).await.unwrap();
        assert_eq!(ctx.perms(), Some("rw"));
        assert!(ctx.subject().is_none());

        for path in ["/spaces/42/messages", "/spaces/420", "/spaces/4", "/spaces/42/"] {
            let mut ctx = request("GET", path, &token);
            issuer.lookup_permissions(&mut ctx).await.unwrap();
            assert!(ctx.perms().is_none(), "{path}");
        }
    }

    #[tokio::test]
    async fn test_expired_or_forged_capability_grants_nothing() {
        let clock = ManualClock::starting_now();
        let issuer = CapabilityIssuer::new(
            EncryptedTokenStore::new(
                HmacTokenStore::new(
                    DatabaseTokenStore::in_memory(clock.clone()).unwrap(),
                    SecretKey::generate(),
                ),
                SecretKey::generate(),
            ),
            clock.clone(),
        );
        let uri = issuer
            .create_uri(
                &RequestContext::new("POST", "/spaces"),
                "/spaces/1",
                "r",
                Duration::minutes(1),
            )
            .await
            .unwrap();
        let token = access_token(&uri);

        let mut forged = request("GET", "/spaces/1", &format!("{token}x"));
        issuer.lookup_permissions(&mut forged).await.unwrap();
        assert!(forged.perms().is_none());

        clock.advance(Duration::minutes(2));
        let mut ctx = request("GET", "/spaces/1", &token);
        issuer.lookup_permissions(&mut ctx).await.unwrap();
        assert!(ctx.perms().is_none());
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let clock = ManualClock::starting_now();
        let issuer = CapabilityIssuer::new(
            EncryptedTokenStore::new(
                DatabaseTokenStore::in_memory(clock.clone()).unwrap(),
                SecretKey::generate(),
            ),
            clock,
        );
        let ctx = RequestContext::new("POST", "/spaces");
        let cases = [
            ("/spaces/1", "rx"),
            ("/spaces/1", ""),
            ("spaces/1", "r"),
            ("/a?b", "r"),
        ];
        for (path, perms) in cases {
            let err = issuer
                .create_uri(&ctx, path, perms, Duration::days(1))
                .await
                .unwrap_err();
            assert!(matches!(err, TesseraError::Invalid { .. }));
        }
    }
}
