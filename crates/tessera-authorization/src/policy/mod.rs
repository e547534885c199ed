//! Attribute-based policy decisions
//!
//! The enforcement point gathers four attribute bundles for a request
//! (subject, resource, action, environment) and hands them to a
//! [`PolicyEvaluator`]. Evaluation starts from permit; any rule may deny and
//! a denial is final.

mod rules;

pub use rules::{Effect, HourWindow, PolicyRule, RuleSet};

use crate::rejection::{Rejection, Verdict};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tessera_core::{Clock, RequestContext, Result, SharedClock};

/// Default-permit decision that can only move to deny
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    permitted: bool,
}

impl Default for Decision {
    fn default() -> Self {
        Self { permitted: true }
    }
}

impl Decision {
    /// A fresh, permitting decision
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny; cannot be undone
    pub fn deny(&mut self) {
        self.permitted = false;
    }

    /// Permit; has no effect once denied
    pub fn permit(&mut self) {}

    /// Whether the request is allowed
    pub fn is_permitted(&self) -> bool {
        self.permitted
    }
}

/// Who is asking
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAttributes {
    /// Authenticated principal
    pub user: Option<String>,
    /// Groups of the principal
    pub groups: Vec<String>,
}

/// What is being accessed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAttributes {
    /// Request path
    pub path: String,
    /// Realm the resource belongs to (the `spaceId` route parameter)
    pub space: Option<String>,
}

/// What is being done
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAttributes {
    /// HTTP method, upper case
    pub method: String,
}

/// Circumstances of the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentAttributes {
    /// When the request is evaluated
    pub time: DateTime<Utc>,
    /// Peer address
    pub ip: Option<IpAddr>,
}

/// All attributes of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRequest {
    /// Subject bundle
    pub subject: SubjectAttributes,
    /// Resource bundle
    pub resource: ResourceAttributes,
    /// Action bundle
    pub action: ActionAttributes,
    /// Environment bundle
    pub environment: EnvironmentAttributes,
}

impl PolicyRequest {
    /// Route parameter naming the realm of a resource
    pub const SPACE_PARAM: &'static str = "spaceId";

    /// Attributes of `ctx` evaluated at `now`
    pub fn from_context(ctx: &RequestContext, now: DateTime<Utc>) -> Self {
        Self {
            subject: SubjectAttributes {
                user: ctx.subject().map(str::to_string),
                groups: ctx.groups().to_vec(),
            },
            resource: ResourceAttributes {
                path: ctx.path().to_string(),
                space: ctx.path_param(Self::SPACE_PARAM).map(str::to_string),
            },
            action: ActionAttributes {
                method: ctx.method().to_string(),
            },
            environment: EnvironmentAttributes {
                time: now,
                ip: ctx.remote_addr(),
            },
        }
    }
}

/// Turns request attributes into a decision
///
/// In-process rules implement this directly; an adapter for an external
/// engine implements it with a network call. An error means no decision
/// could be made and the request is denied.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Apply the policy to `request`, denying on `decision` as needed
    async fn evaluate(&self, request: &PolicyRequest, decision: &mut Decision) -> Result<()>;
}

/// Runs an evaluator for each request and halts denied ones with 403
#[derive(Debug)]
pub struct PolicyEnforcementPoint<E> {
    evaluator: E,
    clock: SharedClock,
}

impl<E: PolicyEvaluator> PolicyEnforcementPoint<E> {
    /// Enforce decisions from `evaluator`
    pub fn new(evaluator: E, clock: SharedClock) -> Self {
        Self { evaluator, clock }
    }

    /// Evaluate `request` from scratch
    pub async fn decide(&self, request: &PolicyRequest) -> Result<Decision> {
        let mut decision = Decision::new();
        self.evaluator.evaluate(request, &mut decision).await?;
        Ok(decision)
    }

    /// Allow or halt the request
    pub async fn enforce(&self, ctx: &RequestContext) -> Verdict {
        let request = PolicyRequest::from_context(ctx, self.clock.now());
        match self.decide(&request).await {
            Ok(decision) if decision.is_permitted() => Ok(()),
            Ok(_) => {
                tracing::debug!(
                    method = %request.action.method,
                    path = %request.resource.path,
                    "denied by policy"
                );
                Err(Rejection::forbidden("denied by policy"))
            }
            Err(error) => {
                tracing::warn!(%error, "policy evaluation failed");
                Err(Rejection::forbidden("policy evaluation failed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rejection::RejectionStatus;
    use tessera_core::{ManualClock, TesseraError};

    struct Failing;

    #[async_trait]
    impl PolicyEvaluator for Failing {
        async fn evaluate(&self, _request: &PolicyRequest, _decision: &mut Decision) -> Result<()> {
            Err(TesseraError::network("rule engine unreachable"))
        }
    }

    #[test]
    fn test_deny_is_sticky() {
        let mut decision = Decision::new();
        assert!(decision.is_permitted());
        decision.deny();
        decision.permit();
        assert!(!decision.is_permitted());
    }

    #[test]
    fn test_bundles_from_context() {
        let mut ctx = RequestContext::new("post", "/spaces/7/messages")
            .with_path_param("spaceId", "7")
            .with_remote_addr("10.0.0.1".parse().unwrap());
        ctx.set_subject("alice");
        ctx.set_groups(vec!["staff".to_string()]);

        let now = Utc::now();
        let request = PolicyRequest::from_context(&ctx, now);
        assert_eq!(request.subject.user.as_deref(), Some("alice"));
        assert_eq!(request.subject.groups, vec!["staff".to_string()]);
        assert_eq!(request.resource.space.as_deref(), Some("7"));
        assert_eq!(request.action.method, "POST");
        assert_eq!(request.environment.time, now);
        assert_eq!(request.environment.ip, Some("10.0.0.1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_evaluator_failure_fails_closed() {
        let pep = PolicyEnforcementPoint::new(Failing, ManualClock::starting_now());
        let rejection = pep
            .enforce(&RequestContext::new("GET", "/spaces"))
            .await
            .unwrap_err();
        assert_eq!(rejection.status, RejectionStatus::Forbidden);
    }
}
