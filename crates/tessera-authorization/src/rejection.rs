//! Request rejections and RFC 6750 challenges

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::TesseraError;

const INVALID_TOKEN_CHALLENGE: &str =
    r#"Bearer error="invalid_token", error_description="Token is invalid or has expired""#;

/// HTTP status of a rejected request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionStatus {
    /// 401: no acceptable credentials
    Unauthorized,
    /// 403: authenticated but not allowed
    Forbidden,
    /// 503: the authorization backend could not answer
    Unavailable,
}

impl RejectionStatus {
    /// Numeric status code
    pub fn code(self) -> u16 {
        match self {
            RejectionStatus::Unauthorized => 401,
            RejectionStatus::Forbidden => 403,
            RejectionStatus::Unavailable => 503,
        }
    }
}

impl fmt::Display for RejectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A halted request
///
/// The HTTP layer turns this into a response: `status` and, when present,
/// a `WWW-Authenticate` header carrying `challenge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("request rejected with {status}: {reason}")]
pub struct Rejection {
    /// Response status
    pub status: RejectionStatus,
    /// `WWW-Authenticate` header value
    pub challenge: Option<String>,
    /// Short reason for logs; never sent to the client
    pub reason: String,
}

impl Rejection {
    /// 401 with a bare `Bearer` challenge: no token was presented
    pub fn unauthenticated() -> Self {
        Self {
            status: RejectionStatus::Unauthorized,
            challenge: Some("Bearer".to_string()),
            reason: "authentication required".to_string(),
        }
    }

    /// 401 for a presented token that is expired or did not verify
    pub fn invalid_token() -> Self {
        Self {
            status: RejectionStatus::Unauthorized,
            challenge: Some(INVALID_TOKEN_CHALLENGE.to_string()),
            reason: "invalid token".to_string(),
        }
    }

    /// 403 naming the scope the token lacks
    pub fn insufficient_scope(scope: &str) -> Self {
        Self {
            status: RejectionStatus::Forbidden,
            challenge: Some(format!(r#"Bearer error="insufficient_scope", scope="{scope}""#)),
            reason: format!("missing scope {scope}"),
        }
    }

    /// 403 without a challenge
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self {
            status: RejectionStatus::Forbidden,
            challenge: None,
            reason: reason.into(),
        }
    }

    /// The authorization backend failed; the request is denied
    pub fn unavailable(error: &TesseraError) -> Self {
        Self {
            status: RejectionStatus::Unavailable,
            challenge: None,
            reason: error.to_string(),
        }
    }
}

impl From<TesseraError> for Rejection {
    fn from(error: TesseraError) -> Self {
        Self::unavailable(&error)
    }
}

/// Outcome of a filter step
pub type Verdict = std::result::Result<(), Rejection>;
