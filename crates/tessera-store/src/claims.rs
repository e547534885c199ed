//! JWT claim sets shared by the self-contained stores

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::Token;

/// `aud` is either a single string or an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub(crate) fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Claims minted by Tessera's own JWT stores
///
/// Token attributes are nested under `attrs` so no attribute can collide
/// with a registered claim name.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) sub: Option<String>,
    pub(crate) aud: Audience,
    pub(crate) exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) iat: Option<i64>,
    #[serde(default)]
    pub(crate) attrs: BTreeMap<String, String>,
}

impl TokenClaims {
    pub(crate) fn new(
        token: Token,
        audience: &str,
        jti: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let (expiry, sub, attrs) = token.into_parts();
        Self {
            jti,
            sub,
            aud: Audience::One(audience.to_string()),
            exp: expiry.timestamp(),
            iat: Some(now.timestamp()),
            attrs,
        }
    }

    pub(crate) fn parse(payload: &[u8]) -> Option<Self> {
        serde_json::from_slice(payload).ok()
    }

    /// The token, if the audience matches and it has not expired
    pub(crate) fn into_token(self, audience: &str, now: DateTime<Utc>) -> Option<Token> {
        if !self.aud.contains(audience) {
            return None;
        }
        let expiry = Utc.timestamp_opt(self.exp, 0).single()?;
        let token = Token::from_parts(expiry, self.sub, self.attrs);
        token.is_valid_at(now).then_some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_audience_forms() {
        let one: Audience = serde_json::from_str(r#""https://api""#).unwrap();
        let many: Audience = serde_json::from_str(r#"["https://other","https://api"]"#).unwrap();
        assert!(one.contains("https://api"));
        assert!(many.contains("https://api"));
        assert!(!many.contains("https://nope"));
    }

    #[test]
    fn test_wrong_audience_or_expired() {
        let now = Utc::now();
        let token = Token::new(now + Duration::minutes(1), "alice");
        let claims = TokenClaims::new(token, "https://api", None, now);
        let json = serde_json::to_vec(&claims).unwrap();

        assert!(TokenClaims::parse(&json)
            .unwrap()
            .into_token("https://other", now)
            .is_none());
        assert!(TokenClaims::parse(&json)
            .unwrap()
            .into_token("https://api", now + Duration::minutes(2))
            .is_none());
        assert!(TokenClaims::parse(&json)
            .unwrap()
            .into_token("https://api", now)
            .is_some());
    }
}
