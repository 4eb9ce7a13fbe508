//! # janus-policy
//!
//! Policy decision point for Janus.
//!
//! Given a request (subject, action, resource, attributes), the
//! [`PolicyDecisionPoint`] checks it against every policy in a
//! [`PolicyStore`] and resolves the matches into one [`FinalDecision`]:
//! allow, deny, or require approval, with a per-policy trace.
//!
//! ## Key invariants
//!
//! - **Default deny**: no matching policy → denied by `default-deny`.
//! - **Deny supremacy**: any matching deny wins, whatever its level or priority.
//! - **Tie-break**: inside the winning effect class, the lowest
//!   (level rank, priority) pair decides. Enterprise < domain < agent < runtime.
//! - **Unknown effects never allow**: a matched policy with an unrecognized
//!   effect is reported as `unknown` and ignored by resolution.
//!
//! ```rust
//! use janus_policy::{Effect, EvaluationRequest, Policy, PolicyDecisionPoint, PolicyStore};
//!
//! let mut store = PolicyStore::new();
//! store
//!     .add(Policy::new("small-payments", "payment.transfer", Effect::Allow).with_amount_max(999.0))
//!     .unwrap();
//!
//! let pdp = PolicyDecisionPoint::new(store);
//! let decision = pdp.evaluate(
//!     &EvaluationRequest::new("payment-agent-1", "payment.transfer").with_attr("amount", 500.0),
//! );
//! assert!(decision.allow);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod pattern;
pub mod policy;
pub mod store;

pub use config::PdpConfig;
pub use engine::{
    compute_final_decision, evaluate_policies, matches, result_for_single_policy,
    EvaluationReport, EvaluationRequest, FinalDecision, MatchResult, PolicyDecisionPoint,
    PolicyOutcome, DEFAULT_DENY_POLICY,
};
pub use error::PolicyError;
pub use loader::{parse_policies, LoadReport, PolicyLoader};
pub use pattern::matches_pattern;
pub use policy::{AttrValue, Attributes, Effect, Level, MatchConstraints, Policy};
pub use store::{DuplicatePolicy, PolicySource, PolicyStore, SharedPolicyStore};
