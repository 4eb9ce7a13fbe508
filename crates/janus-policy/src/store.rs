// store.rs — In-memory policy store and the hot-reload handle around it.
//
// `PolicyStore` keeps policies in insertion order so traces and logs are
// reproducible run to run. The engine never relies on that order for
// correctness; it re-sorts matched policies itself.
//
// `SharedPolicyStore` is the concurrent form: evaluators take an `Arc`
// snapshot, and a reload swaps the whole set in one step, so a reader sees
// either the old set or the new one, never a mixture.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::policy::Policy;

/// What `PolicyStore::add` does when the id is already present.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the existing policy and return `PolicyError::DuplicatePolicy`.
    #[default]
    Reject,
    /// Replace the existing policy in place (last write wins).
    Overwrite,
}

/// Anything the decision engine can read the full policy listing from.
pub trait PolicySource {
    /// Run `f` against the current listing.
    fn with_policies<R>(&self, f: impl FnOnce(&[Policy]) -> R) -> R;
}

impl<T: PolicySource + ?Sized> PolicySource for &T {
    fn with_policies<R>(&self, f: impl FnOnce(&[Policy]) -> R) -> R {
        (**self).with_policies(f)
    }
}

impl<T: PolicySource + ?Sized> PolicySource for Arc<T> {
    fn with_policies<R>(&self, f: impl FnOnce(&[Policy]) -> R) -> R {
        (**self).with_policies(f)
    }
}

/// An insertion-ordered collection of policies, unique by id.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    policies: Vec<Policy>,
    index: HashMap<String, usize>,
    duplicates: DuplicatePolicy,
}

impl PolicyStore {
    /// Create an empty store that rejects duplicate ids.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given duplicate-id handling.
    pub fn with_duplicate_policy(duplicates: DuplicatePolicy) -> Self {
        Self {
            duplicates,
            ..Self::default()
        }
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicates
    }

    /// Insert a policy.
    ///
    /// Policies without an id or action are rejected. A repeated id is either
    /// rejected or overwrites the earlier policy at its original position,
    /// depending on the store's `DuplicatePolicy`.
    pub fn add(&mut self, policy: Policy) -> Result<(), PolicyError> {
        policy.validate()?;

        match self.index.get(&policy.id) {
            Some(&pos) => match self.duplicates {
                DuplicatePolicy::Reject => Err(PolicyError::DuplicatePolicy { id: policy.id }),
                DuplicatePolicy::Overwrite => {
                    tracing::debug!(policy = %policy.id, "overwriting existing policy");
                    self.policies[pos] = policy;
                    Ok(())
                }
            },
            None => {
                self.index.insert(policy.id.clone(), self.policies.len());
                self.policies.push(policy);
                Ok(())
            }
        }
    }

    /// All held policies, in insertion order.
    pub fn list(&self) -> &[Policy] {
        &self.policies
    }

    /// Look up a policy by id.
    pub fn get(&self, id: &str) -> Option<&Policy> {
        self.index.get(id).map(|&pos| &self.policies[pos])
    }

    /// Number of held policies.
    pub fn size(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Policy ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.policies.iter().map(|p| p.id.as_str())
    }
}

impl PolicySource for PolicyStore {
    fn with_policies<R>(&self, f: impl FnOnce(&[Policy]) -> R) -> R {
        f(&self.policies)
    }
}

/// A cloneable, thread-safe handle to a policy set that can be swapped wholesale.
#[derive(Debug, Clone, Default)]
pub struct SharedPolicyStore {
    current: Arc<RwLock<Arc<PolicyStore>>>,
}

impl SharedPolicyStore {
    pub fn new(store: PolicyStore) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(store))),
        }
    }

    /// The policy set in effect right now. Later reloads do not affect it.
    pub fn snapshot(&self) -> Arc<PolicyStore> {
        // The lock only guards an Arc swap, so a poisoned lock still holds a
        // complete value.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Atomically replace the policy set, returning the previous one.
    pub fn replace(&self, store: PolicyStore) -> Arc<PolicyStore> {
        let next = Arc::new(store);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(policies = next.size(), "policy set replaced");
        std::mem::replace(&mut *guard, next)
    }
}

impl PolicySource for SharedPolicyStore {
    fn with_policies<R>(&self, f: impl FnOnce(&[Policy]) -> R) -> R {
        let snapshot = self.snapshot();
        f(snapshot.list())
    }
}

impl From<PolicyStore> for SharedPolicyStore {
    fn from(store: PolicyStore) -> Self {
        Self::new(store)
    }
}
