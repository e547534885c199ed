//! Symmetric key material
//!
//! Keys are loaded once at startup and never change afterwards, so every
//! store can share them across concurrent requests without locking.

use crate::encoding::{base64url_decode, base64url_encode, random_bytes};
use crate::errors::{Result, TesseraError};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret key bytes, zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Minimum accepted key length in bytes
    pub const MIN_LEN: usize = 32;

    /// Wrap raw key bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < Self::MIN_LEN {
            return Err(TesseraError::config(format!(
                "key must be at least {} bytes, got {}",
                Self::MIN_LEN,
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Decode a base64url key
    pub fn from_base64url(encoded: &str) -> Result<Self> {
        let bytes = base64url_decode(encoded.trim())
            .ok_or_else(|| TesseraError::config("key is not valid base64url"))?;
        Self::from_bytes(bytes)
    }

    /// Fresh random 256-bit key
    pub fn generate() -> Self {
        Self {
            bytes: random_bytes::<32>().to_vec(),
        }
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The first 32 bytes, as fixed-size AEAD keys require
    ///
    /// Fails once the key has been zeroized.
    pub fn key_256(&self) -> Result<[u8; 32]> {
        self.bytes
            .get(..32)
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .ok_or_else(|| TesseraError::crypto("key material has been cleared"))
    }

    /// Encode for storage in configuration
    pub fn to_base64url(&self) -> String {
        base64url_encode(&self.bytes)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<{} bytes>)", self.bytes.len())
    }
}
