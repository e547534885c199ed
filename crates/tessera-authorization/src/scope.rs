//! OAuth2 scope checks

use crate::rejection::{Rejection, Verdict};
use tessera_core::RequestContext;

/// Requires `scope` on requests with the given method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFilter {
    method: String,
    scope: String,
}

impl ScopeFilter {
    /// Require `scope` for `method` requests
    pub fn new(method: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            scope: scope.into(),
        }
    }

    /// Method this filter applies to
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Required scope
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Check the validated token on `ctx`
    ///
    /// Requests with another method pass. So do requests whose token has no
    /// `scope` attribute, which were authenticated by some other means.
    pub fn check(&self, ctx: &RequestContext) -> Verdict {
        if !ctx.method_is(&self.method) {
            return Ok(());
        }
        let Some(scopes) = ctx.token().and_then(|token| token.scopes()) else {
            return Ok(());
        };
        if scopes.contains(self.scope.as_str()) {
            Ok(())
        } else {
            tracing::debug!(method = %self.method, scope = %self.scope, "insufficient scope");
            Err(Rejection::insufficient_scope(&self.scope))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use tessera_core::{attrs, Token};

    fn request(method: &str, scope: Option<&str>) -> RequestContext {
        let mut ctx = RequestContext::new(method, "/spaces");
        let mut token = Token::new(Utc::now() + Duration::minutes(5), "alice");
        if let Some(scope) = scope {
            token = token.with_attribute(attrs::SCOPE, scope);
        }
        ctx.set_token(token);
        ctx
    }

    #[test]
    fn test_scope_set_membership() {
        let ctx = request("POST", Some("a b"));
        assert!(ScopeFilter::new("POST", "a").check(&ctx).is_ok());
        assert!(ScopeFilter::new("POST", "b").check(&ctx).is_ok());
        let rejection = ScopeFilter::new("POST", "c").check(&ctx).unwrap_err();
        assert_eq!(rejection, Rejection::insufficient_scope("c"));
    }

    #[test]
    fn test_substring_is_not_membership() {
        let ctx = request("POST", Some("read_all write"));
        assert!(ScopeFilter::new("POST", "read").check(&ctx).is_err());
    }

    #[test]
    fn test_other_method_and_missing_scope_pass() {
        assert!(ScopeFilter::new("DELETE", "c").check(&request("POST", Some("a b"))).is_ok());
        assert!(ScopeFilter::new("POST", "c").check(&request("POST", None)).is_ok());
        assert!(ScopeFilter::new("post", "c").check(&request("POST", Some("a"))).is_err());
    }

    proptest! {
        #[test]
        fn prop_granted_iff_listed(
            scopes in proptest::collection::btree_set("[a-z_]{1,8}", 0..6),
            required in "[a-z_]{1,8}",
        ) {
            let joined = scopes.iter().cloned().collect::<Vec<_>>().join(" ");
            let ctx = request("GET", Some(&joined));
            let verdict = ScopeFilter::new("GET", required.clone()).check(&ctx);
            prop_assert_eq!(verdict.is_ok(), scopes.contains(&required));
        }
    }
}
