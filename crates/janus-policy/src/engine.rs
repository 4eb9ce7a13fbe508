// engine.rs — Multi-policy decision engine.
//
// Every request is checked against every policy; nothing short-circuits, so
// the trace always has one entry per policy. The matched subset is then
// reduced to a single decision:
//
// 1. Nothing matched → default deny.
// 2. Sort matched policies by (level rank, priority), ascending and stable.
// 3. Scan for the first deny, then the first require_approval, then the
//    first allow. Effect precedence is global: one matching deny anywhere
//    beats every allow and approval, whatever their level or priority.
//    Level and priority only pick the winner inside an effect class.
// 4. No recognized effect among the matches → default deny.
//
// Evaluation is a pure function of (policy listing, request). It never
// errors; the worst case is the default-deny decision.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::matches_pattern;
use crate::policy::{amount, AttrValue, Attributes, Effect, Level, Policy};
use crate::store::PolicySource;

/// Id reported when no policy decided the request.
pub const DEFAULT_DENY_POLICY: &str = "default-deny";

const NO_MATCH_REASON: &str = "No matching policies";
const FALLBACK_REASON: &str = "Default deny";

/// One decision request: who wants to do what, to which resource, with which attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub subject: String,
    pub action: String,
    /// Absent means `*`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default)]
    pub attrs: Attributes,
}

impl EvaluationRequest {
    pub fn new(subject: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            action: action.into(),
            resource: None,
            attrs: Attributes::new(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs.extend(attrs);
        self
    }

    /// The resource to match against, defaulting to `*`.
    pub fn resource(&self) -> &str {
        self.resource.as_deref().unwrap_or("*")
    }
}

/// What a single policy says about a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    NotApplicable,
    Allow,
    Deny,
    RequireApproval,
    /// Matched, but the policy's effect is not one the engine recognizes.
    Unknown,
}

impl fmt::Display for PolicyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyOutcome::NotApplicable => write!(f, "not_applicable"),
            PolicyOutcome::Allow => write!(f, "allow"),
            PolicyOutcome::Deny => write!(f, "deny"),
            PolicyOutcome::RequireApproval => write!(f, "require_approval"),
            PolicyOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// One line of the evaluation trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchResult {
    /// Policy id.
    pub policy: String,
    pub level: Level,
    pub priority: i64,
    pub effect: Effect,
    pub matches: bool,
    pub result: PolicyOutcome,
}

/// The single decision for a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalDecision {
    pub allow: bool,
    pub effect: Effect,
    pub reason: String,
    /// Id of the deciding policy, or `default-deny`.
    pub matched_policy: String,
}

impl FinalDecision {
    pub fn allow_by(policy_id: &str) -> Self {
        Self {
            allow: true,
            effect: Effect::Allow,
            reason: format!("Allow by policy {}", policy_id),
            matched_policy: policy_id.to_string(),
        }
    }

    pub fn deny_by(policy_id: &str) -> Self {
        Self {
            allow: false,
            effect: Effect::Deny,
            reason: format!("Deny by policy {}", policy_id),
            matched_policy: policy_id.to_string(),
        }
    }

    pub fn approval_by(policy_id: &str) -> Self {
        Self {
            allow: false,
            effect: Effect::RequireApproval,
            reason: format!("Approval required by policy {}", policy_id),
            matched_policy: policy_id.to_string(),
        }
    }

    pub fn default_deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            effect: Effect::Deny,
            reason: reason.into(),
            matched_policy: DEFAULT_DENY_POLICY.to_string(),
        }
    }

    /// Whether no policy decided this request.
    pub fn is_default_deny(&self) -> bool {
        self.matched_policy == DEFAULT_DENY_POLICY
    }
}

/// Full evaluation output: the per-policy trace plus the final decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationReport {
    /// One entry per policy, in listing order.
    pub matches: Vec<MatchResult>,
    #[serde(rename = "final")]
    pub final_decision: FinalDecision,
}

/// Check whether a policy applies to a request.
///
/// All of action, subject, and resource patterns must match, and the
/// request's `amount` must sit inside any bounds. A missing (or non-numeric)
/// amount counts as 0 against `amount_min` and as unbounded against `amount_max`.
pub fn matches(policy: &Policy, request: &EvaluationRequest) -> bool {
    if !matches_pattern(&policy.action, &request.action) {
        return false;
    }
    if !matches_pattern(&policy.subject, &request.subject) {
        return false;
    }
    if !matches_pattern(&policy.resource, request.resource()) {
        return false;
    }

    let amount = amount(&request.attrs);
    let constraints = &policy.match_constraints;

    if let Some(max) = constraints.amount_max {
        if amount.unwrap_or(f64::INFINITY) > max {
            return false;
        }
    }
    if let Some(min) = constraints.amount_min {
        if amount.unwrap_or(0.0) < min {
            return false;
        }
    }

    true
}

/// Per-policy outcome for the trace.
pub fn result_for_single_policy(policy: &Policy, matched: bool) -> PolicyOutcome {
    if !matched {
        return PolicyOutcome::NotApplicable;
    }
    match policy.effect {
        Effect::Allow => PolicyOutcome::Allow,
        Effect::Deny => PolicyOutcome::Deny,
        Effect::RequireApproval => PolicyOutcome::RequireApproval,
        Effect::Unknown(_) => PolicyOutcome::Unknown,
    }
}

/// Reduce a trace to one decision.
pub fn compute_final_decision(results: &[MatchResult]) -> FinalDecision {
    let mut applicable: Vec<&MatchResult> = results.iter().filter(|m| m.matches).collect();

    if applicable.is_empty() {
        return FinalDecision::default_deny(NO_MATCH_REASON);
    }

    // Stable: equal keys keep listing order.
    applicable.sort_by_key(|m| (m.level.rank(), m.priority));

    if let Some(m) = first_with(&applicable, PolicyOutcome::Deny) {
        return FinalDecision::deny_by(&m.policy);
    }
    if let Some(m) = first_with(&applicable, PolicyOutcome::RequireApproval) {
        return FinalDecision::approval_by(&m.policy);
    }
    if let Some(m) = first_with(&applicable, PolicyOutcome::Allow) {
        return FinalDecision::allow_by(&m.policy);
    }

    tracing::warn!(
        matched = applicable.len(),
        "matched policies carry no recognized effect; falling back to default deny"
    );
    FinalDecision::default_deny(FALLBACK_REASON)
}

fn first_with<'a>(sorted: &[&'a MatchResult], outcome: PolicyOutcome) -> Option<&'a MatchResult> {
    sorted.iter().copied().find(|m| m.result == outcome)
}

/// Evaluate a request against a policy listing.
pub fn evaluate_policies(policies: &[Policy], request: &EvaluationRequest) -> EvaluationReport {
    let matches: Vec<MatchResult> = policies
        .iter()
        .map(|p| {
            let matched = matches(p, request);
            MatchResult {
                policy: p.id.clone(),
                level: p.level.clone(),
                priority: p.priority,
                effect: p.effect.clone(),
                matches: matched,
                result: result_for_single_policy(p, matched),
            }
        })
        .collect();

    let final_decision = compute_final_decision(&matches);
    EvaluationReport {
        matches,
        final_decision,
    }
}

/// Evaluates requests against a policy source.
///
/// Holds no mutable state. Safe to share across threads whenever the source is.
#[derive(Debug, Clone)]
pub struct PolicyDecisionPoint<S> {
    source: S,
}

impl<S: PolicySource> PolicyDecisionPoint<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Decide a request.
    pub fn evaluate(&self, request: &EvaluationRequest) -> FinalDecision {
        self.evaluate_all(request).final_decision
    }

    /// Decide a request and return the per-policy trace alongside the decision.
    pub fn evaluate_all(&self, request: &EvaluationRequest) -> EvaluationReport {
        tracing::debug!(
            subject = %request.subject,
            action = %request.action,
            resource = %request.resource(),
            attrs = ?request.attrs,
            "evaluating request"
        );

        let report = self
            .source
            .with_policies(|policies| evaluate_policies(policies, request));

        tracing::debug!(
            effect = %report.final_decision.effect,
            matched_policy = %report.final_decision.matched_policy,
            policies = report.matches.len(),
            matched = report.matches.iter().filter(|m| m.matches).count(),
            "{}",
            report.final_decision.reason
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PolicyStore;

    fn pdp(policies: Vec<Policy>) -> PolicyDecisionPoint<PolicyStore> {
        let mut store = PolicyStore::new();
        for p in policies {
            store.add(p).unwrap();
        }
        PolicyDecisionPoint::new(store)
    }

    fn transfer(subject: &str, amount: f64) -> EvaluationRequest {
        EvaluationRequest::new(subject, "payment.transfer").with_attr("amount", amount)
    }

    /// P1: small transfers allowed. P2: large transfers denied.
    fn payment_policies() -> Vec<Policy> {
        vec![
            Policy::new("P1", "payment.transfer", Effect::Allow)
                .with_priority(10)
                .with_amount_max(999.0),
            Policy::new("P2", "payment.transfer", Effect::Deny)
                .with_priority(10)
                .with_amount_min(1000.0),
        ]
    }

    #[test]
    fn no_policies_is_default_deny() {
        let engine = pdp(vec![]);
        let decision = engine.evaluate(&EvaluationRequest::new("agent-1", "anything"));

        assert!(!decision.allow);
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.matched_policy, DEFAULT_DENY_POLICY);
        assert_eq!(decision.reason, "No matching policies");
        assert!(decision.is_default_deny());
    }

    #[test]
    fn unmatched_request_is_default_deny() {
        let engine = pdp(payment_policies());
        let decision = engine.evaluate(&EvaluationRequest::new("agent-1", "payment.wire"));
        assert_eq!(decision, FinalDecision::default_deny("No matching policies"));
    }

    #[test]
    fn small_transfer_allowed() {
        let engine = pdp(payment_policies());
        let decision = engine.evaluate(&transfer("agent-1", 500.0));

        assert!(decision.allow);
        assert_eq!(decision.effect, Effect::Allow);
        assert_eq!(decision.matched_policy, "P1");
        assert_eq!(decision.reason, "Allow by policy P1");
    }

    #[test]
    fn large_transfer_denied_by_min_bound() {
        let engine = pdp(payment_policies());
        let decision = engine.evaluate(&transfer("agent-1", 1000.0));

        assert!(!decision.allow);
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.matched_policy, "P2");
        assert_eq!(decision.reason, "Deny by policy P2");
    }

    #[test]
    fn amount_bounds_are_inclusive() {
        let max = Policy::new("max", "a", Effect::Allow).with_amount_max(999.0);
        let min = Policy::new("min", "a", Effect::Allow).with_amount_min(10000.0);
        let req = |amount: f64| EvaluationRequest::new("s", "a").with_attr("amount", amount);

        assert!(matches(&max, &req(999.0)));
        assert!(!matches(&max, &req(1000.0)));
        assert!(matches(&min, &req(10000.0)));
        assert!(!matches(&min, &req(9999.0)));
    }

    #[test]
    fn missing_amount_is_zero_for_min_and_unbounded_for_max() {
        let max = Policy::new("max", "a", Effect::Allow).with_amount_max(999.0);
        let min_zero = Policy::new("min0", "a", Effect::Allow).with_amount_min(0.0);
        let min_one = Policy::new("min1", "a", Effect::Allow).with_amount_min(1.0);
        let req = EvaluationRequest::new("s", "a");

        assert!(!matches(&max, &req));
        assert!(matches(&min_zero, &req));
        assert!(!matches(&min_one, &req));
    }

    #[test]
    fn non_numeric_amount_counts_as_missing() {
        let max = Policy::new("max", "a", Effect::Allow).with_amount_max(999.0);
        let req = EvaluationRequest::new("s", "a").with_attr("amount", "cheap");
        assert!(!matches(&max, &req));

        // Numeric strings are read as numbers.
        let req = EvaluationRequest::new("s", "a").with_attr("amount", "500");
        assert!(matches(&max, &req));
    }

    #[test]
    fn resource_defaults_to_wildcard() {
        let external = Policy::new("ext", "data.export", Effect::Deny).with_resource("external");
        let any = Policy::new("any", "data.export", Effect::Deny);

        let req = EvaluationRequest::new("s", "data.export");
        assert_eq!(req.resource(), "*");
        assert!(!matches(&external, &req));
        assert!(matches(&any, &req));
        assert!(matches(&external, &req.clone().with_resource("external")));
    }

    #[test]
    fn deny_beats_stronger_allow_and_approval() {
        let engine = pdp(vec![
            Policy::new("enterprise-allow", "a", Effect::Allow)
                .with_level(Level::Enterprise)
                .with_priority(1),
            Policy::new("domain-approval", "a", Effect::RequireApproval)
                .with_level(Level::Domain)
                .with_priority(1),
            Policy::new("runtime-deny", "a", Effect::Deny)
                .with_level(Level::Runtime)
                .with_priority(99),
        ]);

        let decision = engine.evaluate(&EvaluationRequest::new("s", "a"));
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.matched_policy, "runtime-deny");
    }

    #[test]
    fn approval_beats_allow() {
        let engine = pdp(vec![
            Policy::new("allow", "a", Effect::Allow).with_level(Level::Enterprise),
            Policy::new("approve", "a", Effect::RequireApproval).with_level(Level::Runtime),
        ]);

        let decision = engine.evaluate(&EvaluationRequest::new("s", "a"));
        assert!(!decision.allow);
        assert_eq!(decision.effect, Effect::RequireApproval);
        assert_eq!(decision.reason, "Approval required by policy approve");
    }

    #[test]
    fn level_breaks_ties_before_priority() {
        let engine = pdp(vec![
            Policy::new("agent-deny", "a", Effect::Deny)
                .with_level(Level::Agent)
                .with_priority(1),
            Policy::new("domain-deny", "a", Effect::Deny)
                .with_level(Level::Domain)
                .with_priority(90),
            Policy::new("runtime-deny", "a", Effect::Deny)
                .with_level(Level::Runtime)
                .with_priority(0),
        ]);

        let decision = engine.evaluate(&EvaluationRequest::new("s", "a"));
        assert_eq!(decision.matched_policy, "domain-deny");
    }

    #[test]
    fn lower_priority_number_wins_within_level() {
        let engine = pdp(vec![
            Policy::new("weak", "a", Effect::Allow).with_priority(50),
            Policy::new("strong", "a", Effect::Allow).with_priority(-5),
            Policy::new("middle", "a", Effect::Allow).with_priority(10),
        ]);

        let decision = engine.evaluate(&EvaluationRequest::new("s", "a"));
        assert_eq!(decision.matched_policy, "strong");
    }

    #[test]
    fn equal_keys_keep_listing_order() {
        let engine = pdp(vec![
            Policy::new("first", "a", Effect::Allow),
            Policy::new("second", "a", Effect::Allow),
        ]);

        let decision = engine.evaluate(&EvaluationRequest::new("s", "a"));
        assert_eq!(decision.matched_policy, "first");
    }

    #[test]
    fn unrecognized_level_ranks_as_agent() {
        let engine = pdp(vec![
            Policy::new("odd", "a", Effect::Allow)
                .with_level(Level::Unrecognized("galaxy".to_string()))
                .with_priority(5),
            Policy::new("agent", "a", Effect::Allow).with_priority(6),
            Policy::new("runtime", "a", Effect::Allow)
                .with_level(Level::Runtime)
                .with_priority(0),
        ]);

        let decision = engine.evaluate(&EvaluationRequest::new("s", "a"));
        assert_eq!(decision.matched_policy, "odd");
    }

    #[test]
    fn unknown_effect_is_never_promoted() {
        let engine = pdp(vec![Policy::new("weird", "a", Effect::Unknown("maybe".to_string()))
            .with_level(Level::Enterprise)
            .with_priority(0)]);

        let report = engine.evaluate_all(&EvaluationRequest::new("s", "a"));
        assert!(report.matches[0].matches);
        assert_eq!(report.matches[0].result, PolicyOutcome::Unknown);
        assert_eq!(report.final_decision, FinalDecision::default_deny("Default deny"));
    }

    #[test]
    fn unknown_effect_does_not_block_real_allow() {
        let engine = pdp(vec![
            Policy::new("weird", "a", Effect::Unknown("maybe".to_string()))
                .with_level(Level::Enterprise),
            Policy::new("allow", "a", Effect::Allow).with_level(Level::Runtime),
        ]);

        let decision = engine.evaluate(&EvaluationRequest::new("s", "a"));
        assert!(decision.allow);
        assert_eq!(decision.matched_policy, "allow");
    }

    #[test]
    fn result_for_single_policy_maps_effects() {
        let p = |effect| Policy::new("p", "a", effect);
        assert_eq!(
            result_for_single_policy(&p(Effect::Allow), false),
            PolicyOutcome::NotApplicable
        );
        assert_eq!(result_for_single_policy(&p(Effect::Allow), true), PolicyOutcome::Allow);
        assert_eq!(result_for_single_policy(&p(Effect::Deny), true), PolicyOutcome::Deny);
        assert_eq!(
            result_for_single_policy(&p(Effect::RequireApproval), true),
            PolicyOutcome::RequireApproval
        );
        assert_eq!(
            result_for_single_policy(&p(Effect::Unknown("maybe".to_string())), true),
            PolicyOutcome::Unknown
        );
    }

    #[test]
    fn compute_final_decision_ignores_unmatched_entries() {
        let results = vec![MatchResult {
            policy: "deny-but-unmatched".to_string(),
            level: Level::Enterprise,
            priority: 0,
            effect: Effect::Deny,
            matches: false,
            result: PolicyOutcome::NotApplicable,
        }];
        assert!(compute_final_decision(&results).is_default_deny());
    }

    #[test]
    fn trace_has_one_entry_per_policy_in_listing_order() {
        let engine = pdp(payment_policies());
        let report = engine.evaluate_all(&transfer("agent-1", 500.0));

        assert_eq!(report.matches.len(), engine.source().size());
        assert_eq!(report.matches[0].policy, "P1");
        assert!(report.matches[0].matches);
        assert_eq!(report.matches[0].result, PolicyOutcome::Allow);
        assert_eq!(report.matches[1].policy, "P2");
        assert!(!report.matches[1].matches);
        assert_eq!(report.matches[1].result, PolicyOutcome::NotApplicable);
        assert_eq!(report.final_decision.matched_policy, "P1");
    }

    #[test]
    fn evaluate_agrees_with_evaluate_all() {
        let engine = pdp(payment_policies());
        for amount in [0.0, 999.0, 1000.0, 50_000.0] {
            let req = transfer("agent-1", amount);
            assert_eq!(engine.evaluate(&req), engine.evaluate_all(&req).final_decision);
        }
    }

    #[test]
    fn report_serializes_with_wire_field_names() {
        let engine = pdp(payment_policies());
        let report = engine.evaluate_all(&transfer("agent-1", 500.0));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["final"]["allow"], true);
        assert_eq!(json["final"]["effect"], "allow");
        assert_eq!(json["final"]["matched_policy"], "P1");
        assert_eq!(json["matches"][1]["result"], "not_applicable");
        assert_eq!(json["matches"][0]["level"], "agent");
        assert_eq!(json["matches"][0]["priority"], 10);
        assert_eq!(json["matches"][0]["matches"], true);
    }

    #[test]
    fn trace_echoes_unrecognized_level_and_effect_verbatim() {
        let odd: Policy = serde_yaml::from_str(
            "id: odd\naction: a\nlevel: galaxy\neffect: maybe\npriority: 1\n",
        )
        .unwrap();
        let engine = pdp(vec![odd]);
        let report = engine.evaluate_all(&EvaluationRequest::new("s", "a"));

        assert_eq!(report.matches[0].result, PolicyOutcome::Unknown);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["matches"][0]["level"], "galaxy");
        assert_eq!(json["matches"][0]["effect"], "maybe");
        assert_eq!(json["matches"][0]["result"], "unknown");
        assert_eq!(json["final"]["effect"], "deny");
    }

    #[test]
    fn outcome_display_matches_wire_names() {
        for outcome in [
            PolicyOutcome::NotApplicable,
            PolicyOutcome::Allow,
            PolicyOutcome::Deny,
            PolicyOutcome::RequireApproval,
            PolicyOutcome::Unknown,
        ] {
            let wire = serde_json::to_value(outcome).unwrap();
            assert_eq!(wire, serde_json::Value::String(outcome.to_string()));
        }
    }

    #[test]
    fn request_deserializes_with_optional_fields() {
        let req: EvaluationRequest =
            serde_json::from_str(r#"{"subject": "s", "action": "a"}"#).unwrap();
        assert_eq!(req.resource(), "*");
        assert!(req.attrs.is_empty());
    }
}
