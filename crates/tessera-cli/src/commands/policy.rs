// Policy dry runs

use crate::output::print_json;
use anyhow::{Context, Result};
use serde_json::json;
use std::net::IpAddr;
use std::path::Path;
use tessera_authorization::{PolicyEnforcementPoint, PolicyRequest, RuleSet};
use tessera_core::{system_clock, RequestContext};

/// Request attributes given on the command line
#[derive(Debug, Clone)]
pub struct DryRun {
    pub user: Option<String>,
    pub groups: Vec<String>,
    pub method: String,
    pub path: String,
    pub space: Option<String>,
    pub ip: Option<IpAddr>,
}

impl DryRun {
    fn context(&self) -> RequestContext {
        let mut ctx = RequestContext::new(&self.method, &self.path);
        if let Some(space) = &self.space {
            ctx = ctx.with_path_param(PolicyRequest::SPACE_PARAM, space);
        }
        if let Some(ip) = self.ip {
            ctx = ctx.with_remote_addr(ip);
        }
        if let Some(user) = &self.user {
            ctx.set_subject(user);
        }
        ctx.set_groups(self.groups.clone());
        ctx
    }
}

pub async fn run(rules_path: &Path, dry_run: DryRun) -> Result<()> {
    let rules = RuleSet::load(rules_path)
        .with_context(|| format!("loading {}", rules_path.display()))?;
    let rule_count = rules.len();
    let clock = system_clock();
    let request = PolicyRequest::from_context(&dry_run.context(), clock.now());

    let pep = PolicyEnforcementPoint::new(rules, clock);
    let decision = pep.decide(&request).await?;

    print_json(&json!({
        "decision": if decision.is_permitted() { "permit" } else { "deny" },
        "rules": rule_count,
        "request": request,
    }))
}
