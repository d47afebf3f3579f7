//! Static capability table: `(resource kind, action) -> roles`.
//!
//! The table is built in code at startup and never mutated afterwards, so it
//! is shared behind an `Arc` without locking.

use std::collections::{BTreeSet, HashMap, HashSet};

/// Action key that applies to every action on a resource kind.
pub const ANY_ACTION: &str = "*";

/// Allowlist of roles per `(resource kind, action)`.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: HashMap<(String, String), HashSet<String>>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`grant`](Self::grant).
    pub fn allow<I, R>(mut self, resource_kind: &str, action: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.grant(resource_kind, action, roles);
        self
    }

    /// Add roles to the allowlist of `(resource_kind, action)`.
    pub fn grant<I, R>(&mut self, resource_kind: &str, action: &str, roles: I)
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.entries
            .entry((resource_kind.to_string(), action.to_string()))
            .or_default()
            .extend(roles.into_iter().map(Into::into));
    }

    /// Roles allowed to perform `action` on `resource_kind`.
    ///
    /// Includes roles granted on the kind's `*` action.
    pub fn allowlist(&self, resource_kind: &str, action: &str) -> BTreeSet<&str> {
        let exact = self.lookup(resource_kind, action);
        let any = if action == ANY_ACTION {
            None
        } else {
            self.lookup(resource_kind, ANY_ACTION)
        };

        exact
            .into_iter()
            .chain(any)
            .flat_map(|roles| roles.iter().map(String::as_str))
            .collect()
    }

    /// Whether `role` may perform `action` on `resource_kind`.
    pub fn permits(&self, resource_kind: &str, action: &str, role: &str) -> bool {
        let granted = |a: &str| {
            self.lookup(resource_kind, a)
                .map_or(false, |roles| roles.contains(role))
        };
        granted(action) || (action != ANY_ACTION && granted(ANY_ACTION))
    }

    /// Resource kinds that have at least one entry.
    pub fn resource_kinds(&self) -> BTreeSet<&str> {
        self.entries.keys().map(|(kind, _)| kind.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, resource_kind: &str, action: &str) -> Option<&HashSet<String>> {
        self.entries
            .get(&(resource_kind.to_string(), action.to_string()))
    }
}
