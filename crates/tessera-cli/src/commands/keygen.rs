// Key generation

use crate::output::print_json;
use anyhow::Result;
use serde_json::json;
use tessera_core::SecretKey;
use tessera_store::JwsKey;

/// Key purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum KeyKind {
    /// HMAC tag key, also usable as an HS256 signing key
    Hmac,
    /// AEAD encryption key, also usable as a JWE key
    Aead,
    /// Ed25519 signing seed and its public key
    Ed25519,
}

pub fn run(kind: KeyKind) -> Result<()> {
    let key = SecretKey::generate();
    let output = match kind {
        KeyKind::Hmac => json!({
            "kind": "hmac",
            "key": key.to_base64url(),
            "config_keys": ["keys.hmac", "keys.jwt_hmac"],
        }),
        KeyKind::Aead => json!({
            "kind": "aead",
            "key": key.to_base64url(),
            "config_keys": ["keys.aead", "keys.jwe"],
        }),
        KeyKind::Ed25519 => {
            let public_key = JwsKey::ed25519_from_seed(&key)?.public_key_base64url();
            json!({
                "kind": "ed25519",
                "key": key.to_base64url(),
                "public_key": public_key,
                "config_keys": ["keys.jwt_ed25519", "keys.jwt_ed25519_public"],
            })
        }
    };
    print_json(&output)
}
