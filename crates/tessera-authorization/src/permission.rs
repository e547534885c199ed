//! Permission-letter checks against the `perms` granted to a request
//!
//! Permissions are combinations of `r`, `w` and `d`. Something earlier in
//! the chain (a capability lookup, a role lookup) records what the request
//! holds with [`RequestContext::set_perms`]; these filters only compare.

use crate::rejection::{Rejection, Verdict};
use tessera_core::config::{RoutePermission, ALL_PERMISSIONS};
use tessera_core::{RequestContext, Result, TesseraError};

/// Whether every letter of `required` appears in `held`
pub fn holds_all(held: &str, required: &str) -> bool {
    required.chars().all(|letter| held.contains(letter))
}

/// Requires permission letters on requests with the given method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionFilter {
    method: String,
    permission: String,
}

impl PermissionFilter {
    /// Require `permission` for `method` requests
    pub fn new(method: impl Into<String>, permission: impl Into<String>) -> Result<Self> {
        let permission = permission.into();
        if permission.is_empty() || !holds_all(ALL_PERMISSIONS, &permission) {
            return Err(TesseraError::invalid(format!(
                "permission '{permission}' is not a combination of r, w and d"
            )));
        }
        Ok(Self {
            method: method.into(),
            permission,
        })
    }

    /// Required permission letters
    pub fn permission(&self) -> &str {
        &self.permission
    }

    /// Check the permissions recorded on `ctx`; none recorded is a denial
    pub fn check(&self, ctx: &RequestContext) -> Verdict {
        if !ctx.method_is(&self.method) {
            return Ok(());
        }
        match ctx.perms() {
            Some(held) if holds_all(held, &self.permission) => Ok(()),
            held => {
                tracing::debug!(
                    required = %self.permission,
                    held = held.unwrap_or(""),
                    "permission denied"
                );
                Err(Rejection::forbidden(format!(
                    "requires permission {}",
                    self.permission
                )))
            }
        }
    }
}

/// `/spaces/:spaceId/messages` style route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
struct RoutePattern(Vec<String>);

impl RoutePattern {
    fn parse(pattern: &str) -> Self {
        Self(
            pattern
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    fn matches(&self, path: &str) -> bool {
        let mut segments = path.split('/').filter(|segment| !segment.is_empty());
        for expected in &self.0 {
            match segments.next() {
                Some(segment) if expected.starts_with(':') || expected == segment => {}
                _ => return false,
            }
        }
        segments.next().is_none()
    }
}

/// Permission requirements for a set of routes, from `[[routes]]`
#[derive(Debug, Clone, Default)]
pub struct RoutePermissions {
    routes: Vec<(RoutePattern, PermissionFilter)>,
}

impl RoutePermissions {
    /// Build from configuration; configuration validation has already
    /// rejected weak requirements on delegating routes
    pub fn from_config(routes: &[RoutePermission]) -> Result<Self> {
        let routes = routes
            .iter()
            .map(|route| {
                Ok((
                    RoutePattern::parse(&route.path),
                    PermissionFilter::new(route.method.clone(), route.permission.clone())?,
                ))
            })
            .collect::<Result<_>>()?;
        Ok(Self { routes })
    }

    /// Number of configured routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are configured
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Apply every requirement whose route matches the request path
    pub fn check(&self, ctx: &RequestContext) -> Verdict {
        self.routes
            .iter()
            .filter(|(pattern, _)| pattern.matches(ctx.path()))
            .try_for_each(|(_, filter)| filter.check(ctx))
    }
}
