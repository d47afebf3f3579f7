//! Policy data model: identifiers, fact tuples and partial-key queries.

use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Authenticated user (or service account) identifier.
    IdentityId
);

string_id!(
    /// Tenant (care-provider organization) identifier.
    TenantId
);

string_id!(
    /// Role name as stored in grouping facts.
    RoleName
);

// ═══════════════════════════════════════════════════════════════════════════════
// Policy Kind
// ═══════════════════════════════════════════════════════════════════════════════

/// Named relation a fact belongs to. Persisted as the `ptype` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyKind(String);

impl PolicyKind {
    /// Role membership and role hierarchy, scoped by tenant.
    pub const GROUPING: &'static str = "g";

    pub fn grouping() -> Self {
        Self(Self::GROUPING.to_string())
    }

    /// Another independently named relation sharing the same storage.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_grouping(&self) -> bool {
        self.0 == Self::GROUPING
    }
}

impl Default for PolicyKind {
    fn default() -> Self {
        Self::grouping()
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy Fact
// ═══════════════════════════════════════════════════════════════════════════════

/// An immutable policy tuple `(kind, v0, v1, v2)`.
///
/// For grouping facts the positions are `(subject, role, tenant)` where the
/// subject is either an identity or another role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyFact {
    pub kind: PolicyKind,
    pub fields: [String; 3],
}

impl PolicyFact {
    pub fn new(kind: PolicyKind, v0: impl Into<String>, v1: impl Into<String>, v2: impl Into<String>) -> Self {
        Self {
            kind,
            fields: [v0.into(), v1.into(), v2.into()],
        }
    }

    /// Assign `role` to `subject` within `tenant`.
    pub fn grouping(subject: impl Into<String>, role: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self::new(PolicyKind::grouping(), subject, role, tenant)
    }

    pub fn subject(&self) -> &str {
        &self.fields[0]
    }

    pub fn role(&self) -> &str {
        &self.fields[1]
    }

    pub fn tenant(&self) -> &str {
        &self.fields[2]
    }

    /// Every position is non-empty. An empty position would read as a
    /// wildcard once it is used to build a [`RoleQuery`].
    pub fn is_complete(&self) -> bool {
        self.fields.iter().all(|field| !field.is_empty())
    }
}

impl fmt::Display for PolicyFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.kind, self.fields[0], self.fields[1], self.fields[2]
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Query
// ═══════════════════════════════════════════════════════════════════════════════

/// Partial-key filter over facts of one kind.
///
/// Each position is matched exactly; an empty string matches any value at
/// that position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleQuery {
    pub kind: PolicyKind,
    pub subject: String,
    pub role: String,
    pub tenant: String,
}

impl RoleQuery {
    /// Grouping facts of `subject` within `tenant`, any role.
    pub fn roles_of(subject: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            kind: PolicyKind::grouping(),
            subject: subject.into(),
            role: String::new(),
            tenant: tenant.into(),
        }
    }

    /// Grouping facts in `tenant`, every subject and role.
    pub fn tenant(tenant: impl Into<String>) -> Self {
        Self {
            kind: PolicyKind::grouping(),
            tenant: tenant.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_kind(mut self, kind: PolicyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Filter values in storage column order (`v0`, `v1`, `v2`).
    pub fn positions(&self) -> [&str; 3] {
        [&self.subject, &self.role, &self.tenant]
    }

    /// Positional match against a fact.
    pub fn matches(&self, fact: &PolicyFact) -> bool {
        fact.kind == self.kind
            && self
                .positions()
                .iter()
                .zip(fact.fields.iter())
                .all(|(want, have)| want.is_empty() || *want == have.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping_fact_accessors() {
        let fact = PolicyFact::grouping("u1", "administrator", "providerX");
        assert!(fact.kind.is_grouping());
        assert_eq!(fact.subject(), "u1");
        assert_eq!(fact.role(), "administrator");
        assert_eq!(fact.tenant(), "providerX");
        assert_eq!(fact.to_string(), "g, u1, administrator, providerX");
    }

    #[test]
    fn test_query_wildcards_match_any_value() {
        let fact = PolicyFact::grouping("u1", "caregiver", "providerX");

        assert!(RoleQuery::roles_of("u1", "providerX").matches(&fact));
        assert!(RoleQuery::tenant("providerX").matches(&fact));
        assert!(RoleQuery::tenant("").with_role("caregiver").matches(&fact));
    }

    #[test]
    fn test_query_positions_are_not_interchangeable() {
        let fact = PolicyFact::grouping("u1", "caregiver", "providerX");

        // "providerX" in the subject position must not match the tenant field.
        let misplaced = RoleQuery::roles_of("providerX", "");
        assert!(!misplaced.matches(&fact));
        assert!(!RoleQuery::roles_of("u1", "providerY").matches(&fact));
    }

    #[test]
    fn test_query_respects_kind() {
        let fact = PolicyFact::new(PolicyKind::named("g2"), "u1", "caregiver", "providerX");
        assert!(!RoleQuery::roles_of("u1", "providerX").matches(&fact));
        assert!(RoleQuery::roles_of("u1", "providerX")
            .with_kind(PolicyKind::named("g2"))
            .matches(&fact));
    }

    #[test]
    fn test_fact_with_empty_position_is_incomplete() {
        assert!(PolicyFact::grouping("u1", "caregiver", "providerX").is_complete());
        assert!(!PolicyFact::grouping("", "caregiver", "providerX").is_complete());
        assert!(!PolicyFact::grouping("u1", "", "providerX").is_complete());
        assert!(!PolicyFact::grouping("u1", "caregiver", "").is_complete());
    }

    #[test]
    fn test_identifiers_serialize_transparently() {
        let json = serde_json::to_string(&TenantId::new("providerX")).unwrap();
        assert_eq!(json, "\"providerX\"");
    }
}
