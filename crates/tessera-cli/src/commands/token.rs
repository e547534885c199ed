// Token minting and inspection

use crate::output::print_json;
use anyhow::{Context, Result};
use chrono::Duration;
use serde_json::json;
use std::path::Path;
use tessera_core::{
    system_clock, ConfigSource, RequestContext, TesseraConfig, Token, TokenId, TokenStore,
};
use tessera_store::{compose, ComposedStore};

/// Parse `key=value`
pub fn parse_attribute(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

pub fn ttl_from_secs(secs: u64) -> Result<Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .context("ttl out of range")
}

fn open(config_path: &Path) -> Result<ComposedStore> {
    let config = TesseraConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    Ok(compose(&config, system_clock())?)
}

pub async fn mint(
    config_path: &Path,
    subject: &str,
    ttl_secs: u64,
    attributes: Vec<(String, String)>,
) -> Result<()> {
    let store = open(config_path)?;
    let expiry = system_clock()
        .now()
        .checked_add_signed(ttl_from_secs(ttl_secs)?)
        .context("ttl out of range")?;
    let token = attributes
        .into_iter()
        .fold(Token::new(expiry, subject), |token, (key, value)| {
            token.with_attribute(key, value)
        });

    let ctx = RequestContext::new("POST", "/tokens");
    let token_id = store.create(&ctx, token).await?;
    tracing::debug!(chain = store.chain(), "token minted");

    print_json(&json!({
        "token": token_id.as_str(),
        "expiry": expiry,
        "chain": store.chain(),
        "guarantees": store.guarantees().to_string(),
    }))
}

pub async fn inspect(config_path: &Path, token: &str) -> Result<()> {
    let store = open(config_path)?;
    let ctx = RequestContext::new("GET", "/tokens");
    let token_id = TokenId::from(token);

    let output = match store.read(&ctx, &token_id).await? {
        Some(token) if token.is_valid_at(system_clock().now()) => json!({
            "valid": true,
            "token": token,
        }),
        Some(token) => json!({
            "valid": false,
            "reason": "expired",
            "expiry": token.expiry(),
        }),
        None => json!({ "valid": false }),
    };
    print_json(&output)
}
