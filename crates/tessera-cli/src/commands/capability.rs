// Capability URI issuance

use super::token::ttl_from_secs;
use crate::output::print_json;
use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use tessera_authorization::CapabilityIssuer;
use tessera_core::{system_clock, ConfigSource, RequestContext, TesseraConfig};
use tessera_store::compose_secure;

pub async fn run(config_path: &Path, path: &str, perms: &str, ttl_secs: u64) -> Result<()> {
    let config = TesseraConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let clock = system_clock();
    let store = compose_secure(&config, clock.clone())
        .context("capabilities need a confidential and authenticated store chain")?;
    let chain = store.chain().to_string();

    let issuer = CapabilityIssuer::new(store, clock);
    let ctx = RequestContext::new("POST", "/capabilities");
    let uri = issuer
        .create_uri(&ctx, path, perms, ttl_from_secs(ttl_secs)?)
        .await?;

    print_json(&json!({
        "uri": uri,
        "path": path,
        "perms": perms,
        "chain": chain,
    }))
}
