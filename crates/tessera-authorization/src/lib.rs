//! Tessera Authorization - request-level checks over a token store
//!
//! Each step takes the [`RequestContext`](tessera_core::RequestContext)
//! and either records something on it or halts the request with a
//! [`Rejection`]:
//!
//! 1. [`TokenAuthenticator::authenticate`] validates the bearer token
//! 2. [`CapabilityIssuer::lookup_permissions`] resolves capability URIs
//! 3. [`require_authentication`], [`ScopeFilter`], [`PermissionFilter`] and
//!    [`PolicyEnforcementPoint`] allow or halt

#![forbid(unsafe_code)]

/// Bearer-token authentication
pub mod authenticate;

/// Capability URIs
pub mod capability;

/// Permission-letter checks
pub mod permission;

/// Attribute-based policy decisions
pub mod policy;

/// Halted requests
pub mod rejection;

/// OAuth2 scope checks
pub mod scope;

pub use authenticate::{require_authentication, TokenAuthenticator, DEFAULT_TOKEN_TTL_SECS};
pub use capability::{CapabilityIssuer, ACCESS_TOKEN_PARAM};
pub use permission::{PermissionFilter, RoutePermissions};
pub use policy::{
    Decision, Effect, HourWindow, PolicyEnforcementPoint, PolicyEvaluator, PolicyRequest,
    PolicyRule, RuleSet,
};
pub use rejection::{Rejection, RejectionStatus, Verdict};
pub use scope::ScopeFilter;
