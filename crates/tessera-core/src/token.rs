//! Token model
//!
//! A [`Token`] is the value every store hands back after validation: an
//! absolute expiry, an optional subject and a read-only attribute map. A
//! [`TokenId`] is whatever string a store produced for it; callers never
//! look inside one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Well-known attribute keys
pub mod attrs {
    /// Space separated OAuth2 scope list
    pub const SCOPE: &str = "scope";
    /// Resource path bound into a capability token
    pub const PATH: &str = "path";
    /// Permission letters (`r`, `w`, `d`) granted by a capability token
    pub const PERMS: &str = "perms";
    /// OAuth2 client that obtained the token
    pub const CLIENT_ID: &str = "client_id";
}

/// Immutable credential value produced by a token store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    expiry: DateTime<Utc>,
    subject: Option<String>,
    attributes: BTreeMap<String, String>,
}

impl Token {
    /// Create a token bound to a subject
    pub fn new(expiry: DateTime<Utc>, subject: impl Into<String>) -> Self {
        Self {
            expiry,
            subject: Some(subject.into()),
            attributes: BTreeMap::new(),
        }
    }

    /// Create a token with no subject (capability tokens)
    pub fn unbound(expiry: DateTime<Utc>) -> Self {
        Self {
            expiry,
            subject: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Assemble a token from its parts, as stores do when decoding
    pub fn from_parts(
        expiry: DateTime<Utc>,
        subject: Option<String>,
        attributes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            expiry,
            subject,
            attributes,
        }
    }

    /// Add an attribute while the token is being built
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Absolute expiry
    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// Principal the token was issued to
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// All attributes
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Single attribute lookup
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The `scope` attribute split on whitespace, if present
    pub fn scopes(&self) -> Option<BTreeSet<&str>> {
        self.attribute(attrs::SCOPE)
            .map(|scope| scope.split_whitespace().collect())
    }

    /// A token is only usable strictly before its expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }

    /// Decompose into parts
    pub fn into_parts(self) -> (DateTime<Utc>, Option<String>, BTreeMap<String, String>) {
        (self.expiry, self.subject, self.attributes)
    }
}

/// Opaque token identifier handed to clients
///
/// `Debug` is redacted so identifiers never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the raw identifier
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId(<{} bytes>)", self.0.len())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TokenId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TokenId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for TokenId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
