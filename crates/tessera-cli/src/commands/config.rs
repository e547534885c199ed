// Configuration checks

use crate::output::print_json;
use anyhow::Result;
use serde_json::json;
use std::path::Path;
use tessera_core::{system_clock, ConfigSource, TesseraConfig, TokenStore};
use tessera_store::compose;

/// Load `path`, apply the environment and build the store chain
///
/// Prints the chain and its guarantees; fails with the first problem found.
pub fn check(path: &Path) -> Result<()> {
    let report = TesseraConfig::load(path).and_then(|config| {
        let store = compose(&config, system_clock())?;
        Ok(json!({
            "valid": true,
            "chain": store.chain(),
            "guarantees": store.guarantees().to_string(),
            "secure": store.guarantees().is_secure(),
            "routes": config.routes.len(),
        }))
    });

    match report {
        Ok(report) => print_json(&report),
        Err(error) => {
            print_json(&json!({ "valid": false, "error": error.to_string() }))?;
            Err(error.into())
        }
    }
}
