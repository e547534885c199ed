//! Tessera configuration
//!
//! ```toml
//! [store]
//! backend = "database"
//! wrappers = ["hmac"]
//!
//! [keys]
//! hmac = { env = "TESSERA_HMAC_KEY" }
//!
//! [database]
//! path = "tokens.db"
//! sweep_interval_secs = 600
//!
//! [[routes]]
//! method = "POST"
//! path = "/spaces/:spaceId/members"
//! permission = "rwd"
//! delegates = true
//! ```

mod traits;
mod validation;

pub use traits::ConfigSource;
pub use validation::{ConfigValidator, ValidationError, ValidationResult};

use crate::errors::{Result, TesseraError};
use crate::keys::SecretKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use traits::{env_override, parse_env_u64};

/// Every permission letter a space member can hold
pub const ALL_PERMISSIONS: &str = "rwd";

/// Innermost backend of a store chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Random identifier, token row in SQLite
    Database,
    /// Token serialized into the identifier itself
    Json,
    /// Token bound to a server-side session
    Session,
    /// Self-contained signed JWT
    SignedJwt,
    /// Self-contained encrypted JWT
    EncryptedJwt,
    /// Encrypted JWT plus a database allow-list row
    EncryptedJwtAllowList,
    /// Remote OAuth2 token introspection
    Introspection,
    /// JWT access tokens minted by an external authorization server
    JwtAccessToken,
}

/// Combinator applied around the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperKind {
    /// HMAC-SHA256 tag appended to the identifier
    Hmac,
    /// XChaCha20-Poly1305 envelope around the identifier
    Aead,
}

/// Store chain: a backend plus wrappers applied innermost first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Innermost backend
    pub backend: BackendKind,
    /// Wrappers, innermost first
    pub wrappers: Vec<WrapperKind>,
    /// Refuse to build a chain that is not both confidential and authenticated
    pub require_secure: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Database,
            wrappers: vec![WrapperKind::Hmac],
            require_secure: true,
        }
    }
}

impl BackendKind {
    /// Whether the backend only validates tokens minted elsewhere
    pub fn is_verify_only(&self) -> bool {
        matches!(self, BackendKind::Introspection | BackendKind::JwtAccessToken)
    }
}

/// Where a key comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySource {
    /// Base64url key inline in the file
    Inline(String),
    /// Base64url key in an environment variable
    Env {
        /// Variable name
        env: String,
    },
}

impl KeySource {
    /// Load the key material
    pub fn resolve(&self) -> Result<SecretKey> {
        match self {
            KeySource::Inline(encoded) => SecretKey::from_base64url(encoded),
            KeySource::Env { env } => {
                let encoded = std::env::var(env).map_err(|_| {
                    TesseraError::config(format!("key variable {env} is not set"))
                })?;
                SecretKey::from_base64url(&encoded)
            }
        }
    }
}

/// Key material, one key per purpose
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// HMAC wrapper key
    pub hmac: Option<KeySource>,
    /// AEAD wrapper key
    pub aead: Option<KeySource>,
    /// HS256 JWT signing key
    pub jwt_hmac: Option<KeySource>,
    /// Ed25519 JWT signing key seed
    pub jwt_ed25519: Option<KeySource>,
    /// Ed25519 JWT verification key, base64url, for verify-only stores
    pub jwt_ed25519_public: Option<String>,
    /// Direct JWE content encryption key
    pub jwe: Option<KeySource>,
}

/// Persistent token table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`
    pub path: String,
    /// Seconds between expiry sweeps
    pub sweep_interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            sweep_interval_secs: 600,
        }
    }
}

impl DatabaseConfig {
    /// Sweep interval as a duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// JWS algorithm for signed tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JwtAlgorithm {
    /// HMAC-SHA256
    #[serde(rename = "HS256")]
    Hs256,
    /// Ed25519
    #[serde(rename = "EdDSA")]
    EdDsa,
}

/// Self-contained token settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Audience minted into and required of every token
    pub audience: String,
    /// Required issuer for externally minted access tokens
    pub issuer: Option<String>,
    /// Signature algorithm
    pub algorithm: JwtAlgorithm,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            audience: "https://localhost:4567".to_string(),
            issuer: None,
            algorithm: JwtAlgorithm::Hs256,
        }
    }
}

/// Remote authorization server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionConfig {
    /// RFC 7662 introspection endpoint
    pub endpoint: String,
    /// RFC 7009 revocation endpoint
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    /// Client id for HTTP Basic authentication
    pub client_id: String,
    /// Client secret for HTTP Basic authentication
    pub client_secret: String,
    /// Per-call timeout in seconds
    #[serde(default = "default_introspection_timeout")]
    pub timeout_secs: u64,
}

fn default_introspection_timeout() -> u64 {
    5
}

impl IntrospectionConfig {
    /// Per-call timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session-bound store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle lifetime of a session in seconds
    pub ttl_secs: u64,
    /// Seconds between purges of idle sessions
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    /// Purge interval as a duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Login and bearer-token settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of tokens minted at login
    pub token_ttl_secs: u64,
    /// Legacy header carrying the token instead of `Authorization`
    pub legacy_header: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 600,
            legacy_header: None,
        }
    }
}

/// Permission required by a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePermission {
    /// HTTP method the requirement applies to
    pub method: String,
    /// Route pattern
    pub path: String,
    /// Permission letters the caller must hold
    pub permission: String,
    /// The route lets the caller grant permissions to someone else
    #[serde(default)]
    pub delegates: bool,
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    /// Store chain
    pub store: StoreConfig,
    /// Key material
    pub keys: KeysConfig,
    /// Persistent table
    pub database: DatabaseConfig,
    /// Self-contained tokens
    pub jwt: JwtConfig,
    /// Remote authorization server
    pub introspection: Option<IntrospectionConfig>,
    /// Sessions
    pub session: SessionConfig,
    /// Login and bearer tokens
    pub auth: AuthConfig,
    /// Route permission requirements
    pub routes: Vec<RoutePermission>,
}

impl ConfigSource for TesseraConfig {
    fn merge_with_env(&mut self) -> Result<()> {
        let prefix = Self::ENV_PREFIX;
        if let Some(path) = env_override(prefix, "DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(value) = env_override(prefix, "DATABASE_SWEEP_INTERVAL_SECS") {
            self.database.sweep_interval_secs =
                parse_env_u64(prefix, "DATABASE_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(backend) = env_override(prefix, "STORE_BACKEND") {
            self.store.backend = serde_json::from_value(serde_json::Value::String(backend))
                .map_err(|_| {
                    TesseraError::config(format!("Invalid backend in {prefix}STORE_BACKEND"))
                })?;
        }
        if let Some(audience) = env_override(prefix, "JWT_AUDIENCE") {
            self.jwt.audience = audience;
        }
        if let Some(value) = env_override(prefix, "AUTH_TOKEN_TTL_SECS") {
            self.auth.token_ttl_secs = parse_env_u64(prefix, "AUTH_TOKEN_TTL_SECS", &value)?;
        }
        if let Some(introspection) = self.introspection.as_mut() {
            if let Some(endpoint) = env_override(prefix, "INTROSPECTION_ENDPOINT") {
                introspection.endpoint = endpoint;
            }
            if let Some(secret) = env_override(prefix, "INTROSPECTION_CLIENT_SECRET") {
                introspection.client_secret = secret;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut validator = ConfigValidator::new();

        let mut keys = validator.for_field("keys");
        for wrapper in &self.store.wrappers {
            match wrapper {
                WrapperKind::Hmac => keys.required("hmac", &self.keys.hmac),
                WrapperKind::Aead => keys.required("aead", &self.keys.aead),
            };
        }
        match (self.store.backend, self.jwt.algorithm) {
            (BackendKind::SignedJwt | BackendKind::JwtAccessToken, JwtAlgorithm::Hs256) => {
                keys.required("jwt_hmac", &self.keys.jwt_hmac);
            }
            (BackendKind::SignedJwt, JwtAlgorithm::EdDsa) => {
                keys.required("jwt_ed25519", &self.keys.jwt_ed25519);
            }
            (BackendKind::JwtAccessToken, JwtAlgorithm::EdDsa) => {
                keys.required("jwt_ed25519_public", &self.keys.jwt_ed25519_public);
            }
            (BackendKind::EncryptedJwt | BackendKind::EncryptedJwtAllowList, _) => {
                keys.required("jwe", &self.keys.jwe);
            }
            _ => {}
        }
        validator.merge(keys);

        if self.store.backend == BackendKind::JwtAccessToken {
            validator.required("jwt.issuer", &self.jwt.issuer);
        }
        if self.store.backend.is_verify_only() {
            validator.custom(
                "store.wrappers",
                &self.store.wrappers,
                |wrappers| wrappers.is_empty(),
                "cannot wrap a backend that only validates external tokens",
            );
        }

        if self.store.backend == BackendKind::Introspection {
            validator.required("introspection", &self.introspection);
        }
        if let Some(introspection) = &self.introspection {
            let mut section = validator.for_field("introspection");
            section
                .url("endpoint", &introspection.endpoint)
                .range("timeout_secs", introspection.timeout_secs, Some(1), Some(60))
                .custom(
                    "client_id",
                    &introspection.client_id,
                    |id| !id.is_empty(),
                    "must not be empty",
                );
            if let Some(revocation) = &introspection.revocation_endpoint {
                section.url("revocation_endpoint", revocation);
            }
            validator.merge(section);
        }

        let mut database = validator.for_field("database");
        database.range("sweep_interval_secs", self.database.sweep_interval_secs, Some(1), None);
        validator.merge(database);

        validator.range("auth.token_ttl_secs", self.auth.token_ttl_secs, Some(1), None);
        validator.range("session.ttl_secs", self.session.ttl_secs, Some(1), None);
        validator.range(
            "session.sweep_interval_secs",
            self.session.sweep_interval_secs,
            Some(1),
            None,
        );
        validator.custom(
            "jwt.audience",
            &self.jwt.audience,
            |aud| !aud.is_empty(),
            "must not be empty",
        );

        validator.each("routes", &self.routes, |v, _, route| {
            validate_route(v, route);
        });

        validator.result().map_err(TesseraError::from)
    }
}

/// Check one route requirement, including the member-addition escalation rule
fn validate_route(validator: &mut ConfigValidator, route: &RoutePermission) {
    validator.custom(
        "method",
        &route.method,
        |m| !m.is_empty(),
        "must not be empty",
    );
    validator.custom(
        "permission",
        &route.permission,
        |p| !p.is_empty() && p.chars().all(|c| ALL_PERMISSIONS.contains(c)),
        "must be a non-empty combination of r, w and d",
    );
    // A caller that can grant permissions must already hold all of them,
    // otherwise a writer could add a member with delete rights.
    if route.delegates && !ALL_PERMISSIONS.chars().all(|c| route.permission.contains(c)) {
        validator.escalation(
            "permission",
            format!(
                "{} {} grants permissions but only requires '{}'; it must require '{ALL_PERMISSIONS}'",
                route.method, route.path, route.permission
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(permission: &str, delegates: bool) -> RoutePermission {
        RoutePermission {
            method: "POST".to_string(),
            path: "/spaces/:spaceId/members".to_string(),
            permission: permission.to_string(),
            delegates,
        }
    }

    fn config_with_keys() -> TesseraConfig {
        let mut config = TesseraConfig::default();
        config.keys.hmac = Some(KeySource::Inline(SecretKey::generate().to_base64url()));
        config
    }

    #[test]
    fn test_default_chain_requires_hmac_key() {
        let err = TesseraConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("keys.hmac"));
        assert!(config_with_keys().validate().is_ok());
    }

    #[test]
    fn test_weak_member_route_is_rejected() {
        let mut config = config_with_keys();
        config.routes.push(route("w", true));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, TesseraError::Config { .. }));
        assert!(err.to_string().contains("privilege escalation"));
    }

    #[test]
    fn test_full_member_route_is_accepted() {
        let mut config = config_with_keys();
        config.routes.push(route("rwd", true));
        config.routes.push(route("w", false));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_permission_letter() {
        let mut config = config_with_keys();
        config.routes.push(route("rx", false));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_introspection_backend_needs_section() {
        let mut config = TesseraConfig::default();
        config.store = StoreConfig {
            backend: BackendKind::Introspection,
            wrappers: vec![],
            require_secure: true,
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("introspection"));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = config_with_keys();
        std::env::set_var("TESSERA_JWT_AUDIENCE", "https://api.example.com");
        std::env::set_var("TESSERA_STORE_BACKEND", "encrypted_jwt");
        let merged = config.merge_with_env();
        std::env::remove_var("TESSERA_JWT_AUDIENCE");
        std::env::remove_var("TESSERA_STORE_BACKEND");

        merged.unwrap();
        assert_eq!(config.jwt.audience, "https://api.example.com");
        assert_eq!(config.store.backend, BackendKind::EncryptedJwt);
        assert!(config.validate().unwrap_err().to_string().contains("keys.jwe"));
    }

    #[test]
    fn test_verify_only_backend_cannot_be_wrapped() {
        let mut config = config_with_keys();
        config.store.backend = BackendKind::JwtAccessToken;
        config.jwt.issuer = Some("https://as.example.com".to_string());
        config.keys.jwt_hmac = Some(KeySource::Inline(SecretKey::generate().to_base64url()));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("store.wrappers"));

        config.store.wrappers.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_purge_interval_must_be_positive() {
        let mut config = config_with_keys();
        assert_eq!(config.session.sweep_interval().as_secs(), 60);
        config.session.sweep_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("session.sweep_interval_secs"));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [store]
            backend = "encrypted_jwt_allow_list"
            wrappers = []

            [keys]
            jwe = { env = "TESSERA_TEST_JWE" }

            [jwt]
            audience = "https://api.example.com"
            algorithm = "EdDSA"

            [[routes]]
            method = "POST"
            path = "/spaces/:spaceId/members"
            permission = "rwd"
            delegates = true
        "#;
        let config: TesseraConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.store.backend, BackendKind::EncryptedJwtAllowList);
        assert_eq!(config.jwt.algorithm, JwtAlgorithm::EdDsa);
        assert_eq!(
            config.keys.jwe,
            Some(KeySource::Env {
                env: "TESSERA_TEST_JWE".to_string()
            })
        );
        assert_eq!(config.database.sweep_interval_secs, 600);
        assert!(config.validate().is_ok());
    }
}
