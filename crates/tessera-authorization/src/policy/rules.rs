//! In-process rules
//!
//! A rule is a flat conjunction of matchers plus an effect. Unset matchers
//! match everything. Rules may also be plain closures over the request.

use super::{Decision, PolicyEvaluator, PolicyRequest};
use async_trait::async_trait;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use tessera_core::{Result, TesseraError};

/// What a matching rule does to the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Leave the decision as is
    Permit,
    /// Deny the request
    Deny,
}

/// UTC hours `[from, to)`; wraps past midnight when `from > to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourWindow {
    /// First hour inside the window
    pub from: u32,
    /// First hour after the window
    pub to: u32,
}

impl HourWindow {
    fn contains(&self, hour: u32) -> bool {
        if self.from < self.to {
            self.from <= hour && hour < self.to
        } else {
            hour >= self.from || hour < self.to
        }
    }

    fn is_valid(&self) -> bool {
        self.from < 24 && self.to < 24 && self.from != self.to
    }
}

/// Declarative rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Label used in logs
    #[serde(default)]
    pub name: Option<String>,
    /// Effect when every matcher matches
    pub effect: Effect,
    /// HTTP method, case-insensitive
    #[serde(default)]
    pub method: Option<String>,
    /// Exact request path
    #[serde(default)]
    pub path: Option<String>,
    /// Request path prefix, at a segment boundary
    #[serde(default)]
    pub path_prefix: Option<String>,
    /// Group the subject must belong to
    #[serde(default)]
    pub group: Option<String>,
    /// Subject the rule applies to
    #[serde(default)]
    pub subject: Option<String>,
    /// Hours of the day the rule applies in
    #[serde(default)]
    pub hours: Option<HourWindow>,
    /// Peer addresses the rule applies to
    #[serde(default)]
    pub ip: Vec<IpAddr>,
}

fn has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl PolicyRule {
    /// Rule with `effect` and no matchers
    pub fn new(effect: Effect) -> Self {
        Self {
            name: None,
            effect,
            method: None,
            path: None,
            path_prefix: None,
            group: None,
            subject: None,
            hours: None,
            ip: Vec::new(),
        }
    }

    /// Whether every set matcher matches `request`
    pub fn matches(&self, request: &PolicyRequest) -> bool {
        let method = self
            .method
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(&request.action.method));
        let path = self
            .path
            .as_deref()
            .map_or(true, |p| p == request.resource.path);
        let prefix = self
            .path_prefix
            .as_deref()
            .map_or(true, |p| has_prefix(&request.resource.path, p));
        let group = self
            .group
            .as_ref()
            .map_or(true, |g| request.subject.groups.contains(g));
        let subject = self
            .subject
            .as_deref()
            .map_or(true, |s| request.subject.user.as_deref() == Some(s));
        let hours = self
            .hours
            .map_or(true, |w| w.contains(request.environment.time.hour()));
        let ip = self.ip.is_empty()
            || request
                .environment
                .ip
                .is_some_and(|addr| self.ip.contains(&addr));
        method && path && prefix && group && subject && hours && ip
    }

    fn validate(&self, index: usize) -> Result<()> {
        if let Some(hours) = self.hours {
            if !hours.is_valid() {
                return Err(TesseraError::config(format!(
                    "rules[{index}].hours must be two different hours between 0 and 23"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<PolicyRule>,
}

type RuleFn = Box<dyn Fn(&PolicyRequest, &mut Decision) + Send + Sync>;

/// Ordered rules evaluated in process
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<PolicyRule>,
    closures: Vec<RuleFn>,
}

impl RuleSet {
    /// Empty rule set; permits everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule set from declarative rules
    pub fn from_rules(rules: Vec<PolicyRule>) -> Result<Self> {
        for (index, rule) in rules.iter().enumerate() {
            rule.validate(index)?;
        }
        Ok(Self {
            rules,
            closures: Vec::new(),
        })
    }

    /// Parse `[[rules]]` from TOML or `{"rules": [...]}` from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TesseraError::config(format!("Failed to read rules file {}: {e}", path.display()))
        })?;
        let file: RulesFile = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| TesseraError::config(format!("Invalid JSON: {e}")))?,
            _ => return Err(TesseraError::config("Unsupported file format")),
        };
        Self::from_rules(file.rules)
    }

    /// Append a declarative rule
    pub fn push(&mut self, rule: PolicyRule) -> Result<()> {
        rule.validate(self.rules.len())?;
        self.rules.push(rule);
        Ok(())
    }

    /// Append a closure rule; closures run after declarative rules
    pub fn with_fn<F>(mut self, rule: F) -> Self
    where
        F: Fn(&PolicyRequest, &mut Decision) + Send + Sync + 'static,
    {
        self.closures.push(Box::new(rule));
        self
    }

    /// Declarative rules
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Number of rules of either kind
    pub fn len(&self) -> usize {
        self.rules.len() + self.closures.len()
    }

    /// Whether there are no rules
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.rules)
            .field("closures", &self.closures.len())
            .finish()
    }
}

#[async_trait]
impl PolicyEvaluator for RuleSet {
    async fn evaluate(&self, request: &PolicyRequest, decision: &mut Decision) -> Result<()> {
        for rule in self.rules.iter().filter(|rule| rule.matches(request)) {
            match rule.effect {
                Effect::Permit => decision.permit(),
                Effect::Deny => {
                    let name = rule.name.as_deref().unwrap_or("unnamed");
                    tracing::debug!(rule = name, "deny rule matched");
                    decision.deny();
                }
            }
        }
        for rule in &self.closures {
            rule(request, decision);
        }
        Ok(())
    }
}
