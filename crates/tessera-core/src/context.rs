//! Per-request context
//!
//! The HTTP framework is not part of Tessera. [`RequestContext`] is the
//! boundary value it hands in: method, path, headers, query parameters and
//! peer address, plus the request-scoped state that authentication and
//! authorization steps attach as the request moves through them.

use crate::token::Token;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Session cookie slot shared between the framework and session-bound stores
///
/// The framework fills it from the inbound cookie and writes whatever it
/// holds after handling back out as `Set-Cookie`.
#[derive(Debug, Default)]
pub struct SessionCookie {
    value: Mutex<Option<String>>,
}

impl SessionCookie {
    /// Slot holding an inbound cookie value
    pub fn new(value: Option<String>) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    /// Current cookie value
    pub fn get(&self) -> Option<String> {
        self.value.lock().clone()
    }

    /// Replace the cookie value
    pub fn set(&self, value: impl Into<String>) {
        *self.value.lock() = Some(value.into());
    }

    /// Drop the cookie
    pub fn clear(&self) {
        *self.value.lock() = None;
    }
}

/// Inbound request as seen by token stores and authorization filters
#[derive(Debug, Default)]
pub struct RequestContext {
    method: String,
    path: String,
    headers: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
    path_params: BTreeMap<String, String>,
    remote_addr: Option<IpAddr>,
    session: SessionCookie,

    // Request-scoped state attached by authentication/authorization steps
    subject: Option<String>,
    groups: Vec<String>,
    token: Option<Token>,
    perms: Option<String>,
    rejected_token: bool,
}

impl RequestContext {
    /// Create a context for `method path`
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Add a header; names are case-insensitive
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Add a query parameter
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Add a route parameter (`:spaceId` style)
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Set the peer address
    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Set the inbound session cookie
    pub fn with_session_cookie(mut self, value: impl Into<String>) -> Self {
        self.session = SessionCookie::new(Some(value.into()));
        self
    }

    /// Request method, upper case
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path without query string
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Query parameter lookup
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Route parameter lookup
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Peer address
    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    /// Session cookie slot
    pub fn session(&self) -> &SessionCookie {
        &self.session
    }

    /// Whether `method` matches this request, ignoring case
    pub fn method_is(&self, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method)
    }

    /// Authenticated principal
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Record the authenticated principal
    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = Some(subject.into());
    }

    /// Groups of the authenticated principal
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Record the principal's groups
    pub fn set_groups(&mut self, groups: Vec<String>) {
        self.groups = groups;
    }

    /// Token validated for this request
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Attach the validated token; also records its subject if it has one
    pub fn set_token(&mut self, token: Token) {
        if let Some(subject) = token.subject() {
            self.subject = Some(subject.to_string());
        }
        self.token = Some(token);
    }

    /// Permission letters granted for this request
    pub fn perms(&self) -> Option<&str> {
        self.perms.as_deref()
    }

    /// Record the permission letters granted for this request
    pub fn set_perms(&mut self, perms: impl Into<String>) {
        self.perms = Some(perms.into());
    }

    /// Whether a presented token failed validation
    pub fn token_rejected(&self) -> bool {
        self.rejected_token
    }

    /// Note that a presented token failed validation
    pub fn mark_token_rejected(&mut self) {
        self.rejected_token = true;
    }
}
