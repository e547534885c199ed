//! Compact JOSE serialization
//!
//! Only what the token stores need: JWS with HS256 or EdDSA (3 parts) and
//! JWE with direct key agreement and A256GCM content encryption (5 parts).
//! Every verification failure is reported as `None`.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use tessera_core::encoding::{base64url_decode, base64url_encode, random_bytes};
use tessera_core::{Result, SecretKey, TesseraError};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const GCM_IV_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

fn encode_header(header: &Header) -> Result<String> {
    Ok(base64url_encode(serde_json::to_vec(header)?))
}

fn decode_header(encoded: &str) -> Option<Header> {
    serde_json::from_slice(&base64url_decode(encoded)?).ok()
}

/// Key for signing and verifying JWS
pub enum JwsKey {
    /// Shared HMAC-SHA256 secret
    Hs256(SecretKey),
    /// Ed25519 key pair
    EdDsa(SigningKey),
    /// Ed25519 public key; verifies but cannot sign
    EdDsaVerify(VerifyingKey),
}

impl JwsKey {
    /// Ed25519 signing key from a 32-byte seed
    pub fn ed25519_from_seed(seed: &SecretKey) -> Result<Self> {
        let seed = Zeroizing::new(seed.key_256()?);
        Ok(Self::EdDsa(SigningKey::from_bytes(&seed)))
    }

    /// Ed25519 verification key from base64url
    pub fn ed25519_public_from_base64url(encoded: &str) -> Result<Self> {
        let bytes: [u8; 32] = base64url_decode(encoded.trim())
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| TesseraError::config("Ed25519 public key must be 32 base64url bytes"))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| TesseraError::config(format!("Invalid Ed25519 public key: {e}")))?;
        Ok(Self::EdDsaVerify(key))
    }

    /// JOSE `alg` value
    pub fn algorithm(&self) -> &'static str {
        match self {
            JwsKey::Hs256(_) => "HS256",
            JwsKey::EdDsa(_) | JwsKey::EdDsaVerify(_) => "EdDSA",
        }
    }

    /// Whether this key can produce signatures
    pub fn can_sign(&self) -> bool {
        !matches!(self, JwsKey::EdDsaVerify(_))
    }

    /// Base64url public key, for Ed25519 keys
    pub fn public_key_base64url(&self) -> Option<String> {
        match self {
            JwsKey::Hs256(_) => None,
            JwsKey::EdDsa(key) => Some(base64url_encode(key.verifying_key().to_bytes())),
            JwsKey::EdDsaVerify(key) => Some(base64url_encode(key.to_bytes())),
        }
    }

    fn hmac(key: &SecretKey, data: &[u8]) -> Result<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
            .map_err(|e| TesseraError::crypto(format!("invalid HMAC key: {e}")))?;
        mac.update(data);
        Ok(mac)
    }

    /// Sign `payload` into a compact JWS
    pub fn sign(&self, payload: &[u8]) -> Result<String> {
        let header = encode_header(&Header {
            alg: self.algorithm().to_string(),
            enc: None,
            typ: Some("JWT".to_string()),
        })?;
        let signing_input = format!("{header}.{}", base64url_encode(payload));
        let signature = match self {
            JwsKey::Hs256(key) => Self::hmac(key, signing_input.as_bytes())?
                .finalize()
                .into_bytes()
                .to_vec(),
            JwsKey::EdDsa(key) => key.sign(signing_input.as_bytes()).to_bytes().to_vec(),
            JwsKey::EdDsaVerify(_) => {
                return Err(TesseraError::crypto("cannot sign with a verification-only key"))
            }
        };
        Ok(format!("{signing_input}.{}", base64url_encode(signature)))
    }

    /// Verify a compact JWS and return its payload
    ///
    /// The header's `alg` must equal this key's algorithm, so `none` and
    /// algorithm substitution are rejected.
    pub fn verify(&self, compact: &str) -> Option<Vec<u8>> {
        let mut parts = compact.split('.');
        let (header, payload, signature) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        if decode_header(header)?.alg != self.algorithm() {
            return None;
        }

        let signing_input = &compact[..header.len() + 1 + payload.len()];
        let signature = base64url_decode(signature)?;
        let valid = match self {
            JwsKey::Hs256(key) => Self::hmac(key, signing_input.as_bytes())
                .ok()?
                .verify_slice(&signature)
                .is_ok(),
            JwsKey::EdDsa(key) => verify_ed25519(&key.verifying_key(), signing_input, &signature),
            JwsKey::EdDsaVerify(key) => verify_ed25519(key, signing_input, &signature),
        };
        if !valid {
            return None;
        }
        base64url_decode(payload)
    }
}

fn verify_ed25519(key: &VerifyingKey, signing_input: &str, signature: &[u8]) -> bool {
    let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    key.verify_strict(signing_input.as_bytes(), &Signature::from_bytes(&bytes))
        .is_ok()
}

impl fmt::Debug for JwsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JwsKey({})", self.algorithm())
    }
}

/// Direct-encryption JWE key (`alg: dir`, `enc: A256GCM`)
#[derive(Debug, Clone)]
pub struct JweKey {
    key: SecretKey,
}

impl JweKey {
    /// Use `key` as the content encryption key
    pub fn new(key: SecretKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        let key = Zeroizing::new(self.key.key_256()?);
        Ok(Aes256Gcm::new((&*key).into()))
    }

    /// Encrypt `payload` into a compact JWE
    pub fn encrypt(&self, payload: &[u8]) -> Result<String> {
        let header = encode_header(&Header {
            alg: "dir".to_string(),
            enc: Some("A256GCM".to_string()),
            typ: Some("JWT".to_string()),
        })?;
        let iv = random_bytes::<GCM_IV_LEN>();
        let sealed = self
            .cipher()?
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: payload,
                    aad: header.as_bytes(),
                },
            )
            .map_err(|e| TesseraError::crypto(format!("Encryption failed: {e}")))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - GCM_TAG_LEN);

        Ok(format!(
            "{header}..{}.{}.{}",
            base64url_encode(iv),
            base64url_encode(ciphertext),
            base64url_encode(tag)
        ))
    }

    /// Decrypt a compact JWE and return its payload
    pub fn decrypt(&self, compact: &str) -> Option<Vec<u8>> {
        let parts: Vec<&str> = compact.split('.').collect();
        let [header, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
            return None;
        };
        if !encrypted_key.is_empty() {
            return None;
        }
        let decoded = decode_header(header)?;
        if decoded.alg != "dir" || decoded.enc.as_deref() != Some("A256GCM") {
            return None;
        }

        let iv = base64url_decode(iv)?;
        let tag = base64url_decode(tag)?;
        if iv.len() != GCM_IV_LEN || tag.len() != GCM_TAG_LEN {
            return None;
        }
        let mut sealed = base64url_decode(ciphertext)?;
        sealed.extend_from_slice(&tag);

        self.cipher()
            .ok()?
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: header.as_bytes(),
                },
            )
            .ok()
    }
}
