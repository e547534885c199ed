//! Requests through the whole chain of checks.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration;
use std::collections::BTreeMap;
use std::io::Write;
use tessera_authorization::{
    require_authentication, CapabilityIssuer, Effect, PolicyEnforcementPoint, PolicyRule,
    RejectionStatus, RoutePermissions, RuleSet, ScopeFilter, TokenAuthenticator,
    ACCESS_TOKEN_PARAM,
};
use tessera_core::config::{KeySource, RoutePermission};
use tessera_core::{attrs, ManualClock, RequestContext, SecretKey, TesseraConfig};
use tessera_store::compose_secure;

fn secure_config() -> TesseraConfig {
    let mut config = TesseraConfig::default();
    config.keys.hmac = Some(KeySource::Inline(SecretKey::generate().to_base64url()));
    config
}

fn token_param(uri: &str) -> String {
    let (_, query) = uri.split_once('?').unwrap();
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == ACCESS_TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

#[tokio::test]
async fn capability_for_exact_path() {
    let clock = ManualClock::starting_now();
    let store = compose_secure(&secure_config(), clock.clone()).unwrap();
    let issuer = CapabilityIssuer::new(store, clock);

    let uri = issuer
        .create_uri(
            &RequestContext::new("POST", "/spaces"),
            "/spaces/7",
            "rwd",
            Duration::days(365),
        )
        .await
        .unwrap();
    let token = token_param(&uri);

    let mut granted =
        RequestContext::new("GET", "/spaces/7").with_query(ACCESS_TOKEN_PARAM, &token);
    issuer.lookup_permissions(&mut granted).await.unwrap();
    assert_eq!(granted.perms(), Some("rwd"));

    let mut sibling =
        RequestContext::new("GET", "/spaces/70").with_query(ACCESS_TOKEN_PARAM, &token);
    issuer.lookup_permissions(&mut sibling).await.unwrap();
    assert!(sibling.perms().is_none());
    assert!(sibling.subject().is_none());
    assert!(sibling.token().is_none());
}

#[tokio::test]
async fn bearer_token_through_every_filter() {
    let clock = ManualClock::starting_now();
    let config = secure_config();
    let auth = TokenAuthenticator::from_config(
        compose_secure(&config, clock.clone()).unwrap(),
        &config.auth,
        clock.clone(),
    )
    .unwrap();

    let attributes = BTreeMap::from([(attrs::SCOPE.to_string(), "a b".to_string())]);
    let id = auth
        .login(&RequestContext::new("POST", "/sessions"), "alice", None, attributes)
        .await
        .unwrap();

    let mut ctx = RequestContext::new("POST", "/spaces/7/messages")
        .with_header("Authorization", format!("Bearer {id}"))
        .with_path_param("spaceId", "7");
    auth.authenticate(&mut ctx).await.unwrap();
    require_authentication(&ctx).unwrap();

    ScopeFilter::new("POST", "a").check(&ctx).unwrap();
    let rejection = ScopeFilter::new("POST", "c").check(&ctx).unwrap_err();
    assert_eq!(rejection.status, RejectionStatus::Forbidden);
    assert_eq!(
        rejection.challenge.as_deref(),
        Some(r#"Bearer error="insufficient_scope", scope="c""#)
    );

    let routes = RoutePermissions::from_config(&[RoutePermission {
        method: "POST".to_string(),
        path: "/spaces/:spaceId/messages".to_string(),
        permission: "w".to_string(),
        delegates: false,
    }])
    .unwrap();
    assert!(routes.check(&ctx).is_err());
    ctx.set_perms("rw");
    routes.check(&ctx).unwrap();

    let pep = PolicyEnforcementPoint::new(
        RuleSet::from_rules(vec![
            PolicyRule::new(Effect::Permit),
            PolicyRule {
                subject: Some("alice".to_string()),
                path_prefix: Some("/spaces/7".to_string()),
                ..PolicyRule::new(Effect::Deny)
            },
        ])
        .unwrap(),
        clock,
    );
    let rejection = pep.enforce(&ctx).await.unwrap_err();
    assert_eq!(rejection.status, RejectionStatus::Forbidden);

    let other_space = RequestContext::new("POST", "/spaces/70/messages");
    pep.enforce(&other_space).await.unwrap();
}

#[tokio::test]
async fn rules_file_drives_decisions() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
[[rules]]
name = "no deletes from outside"
effect = "deny"
method = "DELETE"
ip = ["203.0.113.9"]

[[rules]]
name = "staff may do anything"
effect = "permit"
group = "staff"
"#
    )
    .unwrap();

    let rules = RuleSet::load(file.path()).unwrap();
    assert_eq!(rules.len(), 2);
    let pep = PolicyEnforcementPoint::new(rules, ManualClock::starting_now());

    let mut outside = RequestContext::new("DELETE", "/spaces/1")
        .with_remote_addr("203.0.113.9".parse().unwrap());
    outside.set_subject("bob");
    outside.set_groups(vec!["staff".to_string()]);
    assert!(pep.enforce(&outside).await.is_err());

    let inside = RequestContext::new("DELETE", "/spaces/1")
        .with_remote_addr("10.1.1.1".parse().unwrap());
    pep.enforce(&inside).await.unwrap();
}
