// policy.rs — Policy records and the attribute values they are matched against.
//
// A policy is immutable once loaded. Level and effect are closed enums with a
// catch-all variant holding the raw string, so an unexpected value in a policy
// document survives the load (and shows up as written in traces) but can never
// be mistaken for a real tier or outcome.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Attribute key carrying the numeric amount checked by `amount_min` / `amount_max`.
pub const AMOUNT_ATTR: &str = "amount";

/// The organizational tier a policy belongs to.
///
/// Only used to break ties inside an effect class; a lower rank is stronger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Level {
    Enterprise,
    Domain,
    #[default]
    Agent,
    Runtime,
    /// Any level string outside the vocabulary, kept verbatim. Ranks the same as `Agent`.
    Unrecognized(String),
}

impl Level {
    /// Sort rank: enterprise 1, domain 2, agent 3, runtime 4.
    pub fn rank(&self) -> u8 {
        match self {
            Level::Enterprise => 1,
            Level::Domain => 2,
            Level::Agent | Level::Unrecognized(_) => 3,
            Level::Runtime => 4,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Level::Enterprise => "enterprise",
            Level::Domain => "domain",
            Level::Agent => "agent",
            Level::Runtime => "runtime",
            Level::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for Level {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "enterprise" => Level::Enterprise,
            "domain" => Level::Domain,
            "agent" => Level::Agent,
            "runtime" => Level::Runtime,
            _ => Level::Unrecognized(raw),
        }
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        match level {
            Level::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome a policy asserts when it matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Effect {
    Allow,
    #[default]
    Deny,
    RequireApproval,
    /// Any effect string outside the vocabulary, kept verbatim. Never selected as a decision.
    Unknown(String),
}

impl Effect {
    pub fn as_str(&self) -> &str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
            Effect::RequireApproval => "require_approval",
            Effect::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Effect {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "allow" => Effect::Allow,
            "deny" => Effect::Deny,
            "require_approval" => Effect::RequireApproval,
            _ => Effect::Unknown(raw),
        }
    }
}

impl From<Effect> for String {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request attribute value.
///
/// Variant order matters for untagged deserialization: `true` stays a bool,
/// `"1000"` stays a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl AttrValue {
    /// Numeric view of the value. Strings count when they parse as a finite number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) if !n.is_nan() => Some(*n),
            AttrValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Number(value as f64)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::String(s) => write!(f, "{}", s),
        }
    }
}

/// Request attributes, keyed by name. Ordered so traces print reproducibly.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Read the reserved `amount` attribute. Absent and non-numeric are both `None`.
pub fn amount(attrs: &Attributes) -> Option<f64> {
    attrs.get(AMOUNT_ATTR).and_then(AttrValue::as_number)
}

/// Extra numeric constraints a policy places on the request.
///
/// Bounds are inclusive. Keys other than the amount bounds are kept so the
/// document round-trips, but the engine does not evaluate them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatchConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<f64>,

    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl MatchConstraints {
    pub fn is_empty(&self) -> bool {
        self.amount_min.is_none() && self.amount_max.is_none() && self.other.is_empty()
    }
}

/// A declarative rule: requests matching the patterns and constraints get `effect`.
///
/// ```yaml
/// policies:
///   - id: payments-small-allow
///     level: agent
///     priority: 10
///     action: "payment.transfer"
///     subject: "payment-*"
///     effect: allow
///     match:
///       amount_max: 999
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub id: String,

    #[serde(default)]
    pub level: Level,

    /// Lower is stronger within a level.
    #[serde(default = "default_priority")]
    pub priority: i64,

    /// Pattern matched against the request action.
    pub action: String,

    /// Pattern matched against the request subject.
    #[serde(default = "wildcard")]
    pub subject: String,

    /// Pattern matched against the request resource.
    #[serde(default = "wildcard")]
    pub resource: String,

    #[serde(default)]
    pub effect: Effect,

    #[serde(default, rename = "match", skip_serializing_if = "MatchConstraints::is_empty")]
    pub match_constraints: MatchConstraints,

    #[serde(default)]
    pub description: String,
}

pub(crate) fn default_priority() -> i64 {
    50
}

pub(crate) fn wildcard() -> String {
    "*".to_string()
}

impl Policy {
    /// A policy with every optional field at its default (agent level, priority 50,
    /// `*` subject and resource, no constraints).
    pub fn new(id: impl Into<String>, action: impl Into<String>, effect: Effect) -> Self {
        Self {
            id: id.into(),
            level: Level::default(),
            priority: default_priority(),
            action: action.into(),
            subject: wildcard(),
            resource: wildcard(),
            effect,
            match_constraints: MatchConstraints::default(),
            description: String::new(),
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_amount_min(mut self, bound: f64) -> Self {
        self.match_constraints.amount_min = Some(bound);
        self
    }

    pub fn with_amount_max(mut self, bound: f64) -> Self {
        self.match_constraints.amount_max = Some(bound);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check the load-time invariant: non-empty `id` and `action`.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.id.trim().is_empty() {
            return Err(PolicyError::InvalidPolicy {
                id: self.id.clone(),
                reason: "id must not be empty".to_string(),
            });
        }
        if self.action.trim().is_empty() {
            return Err(PolicyError::InvalidPolicy {
                id: self.id.clone(),
                reason: "action pattern must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
