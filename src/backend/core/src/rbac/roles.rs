//! Predefined roles and the default capability table.
//!
//! Carehub ships with four built-in roles:
//!
//! | Role          | Description                                               |
//! |---------------|-----------------------------------------------------------|
//! | Administrator | Full access to every resource of the provider             |
//! | Caregiver     | Reads patients, records assessments, sees appointments    |
//! | Coordinator   | Manages patients, scheduling and staff rosters            |
//! | Billing       | Manages invoices; reads patient records for billing       |
//!
//! Roles are plain strings in grouping facts, so tenants may define their own
//! roles and link them to these through the role hierarchy.

use super::capability::{CapabilityTable, ANY_ACTION};

/// Resource kinds known to the default capability table.
pub const RESOURCE_KINDS: [&str; 5] = ["patient", "assessment", "appointment", "invoice", "staff"];

/// Predefined role templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedRole {
    Administrator,
    Caregiver,
    Coordinator,
    Billing,
}

impl PredefinedRole {
    /// Role name as stored in grouping facts.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Caregiver => "caregiver",
            Self::Coordinator => "coordinator",
            Self::Billing => "billing",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::Caregiver => "Caregiver",
            Self::Coordinator => "Coordinator",
            Self::Billing => "Billing",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Administrator => "Full access to every resource of the provider",
            Self::Caregiver => "Reads patients, records assessments, sees appointments",
            Self::Coordinator => "Manages patients, scheduling and staff rosters",
            Self::Billing => "Manages invoices and reads patient records",
        }
    }

    /// `(resource kind, action)` pairs this role is granted.
    pub fn grants(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            Self::Administrator => RESOURCE_KINDS.iter().map(|kind| (*kind, ANY_ACTION)).collect(),
            Self::Caregiver => vec![
                ("patient", "read"),
                ("assessment", "read"),
                ("assessment", "create"),
                ("assessment", "update"),
                ("appointment", "read"),
            ],
            Self::Coordinator => vec![
                ("patient", "read"),
                ("patient", "create"),
                ("patient", "update"),
                ("assessment", "read"),
                ("appointment", ANY_ACTION),
                ("staff", "read"),
            ],
            Self::Billing => vec![("patient", "read"), ("invoice", ANY_ACTION)],
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().into_iter().find(|role| role.id() == id)
    }

    pub fn all() -> Vec<PredefinedRole> {
        vec![
            Self::Administrator,
            Self::Caregiver,
            Self::Coordinator,
            Self::Billing,
        ]
    }

    /// Capability table built from every predefined role's grants.
    pub fn default_capabilities() -> CapabilityTable {
        let mut table = CapabilityTable::new();
        for role in Self::all() {
            for (kind, action) in role.grants() {
                table.grant(kind, action, [role.id()]);
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_administrator_has_everything() {
        let table = PredefinedRole::default_capabilities();
        for kind in RESOURCE_KINDS {
            assert!(table.permits(kind, "delete", "administrator"));
            assert!(table.permits(kind, "read", "administrator"));
        }
    }

    #[test]
    fn test_caregiver_permissions() {
        let table = PredefinedRole::default_capabilities();
        assert!(table.permits("patient", "read", "caregiver"));
        assert!(table.permits("assessment", "create", "caregiver"));
        assert!(!table.permits("patient", "delete", "caregiver"));
        assert!(!table.permits("invoice", "read", "caregiver"));
    }

    #[test]
    fn test_billing_permissions() {
        let table = PredefinedRole::default_capabilities();
        assert!(table.permits("invoice", "create", "billing"));
        assert!(table.permits("patient", "read", "billing"));
        assert!(!table.permits("patient", "update", "billing"));
        assert!(!table.permits("staff", "read", "billing"));
    }

    #[test]
    fn test_role_ids_round_trip() {
        for role in PredefinedRole::all() {
            assert_eq!(PredefinedRole::from_id(role.id()), Some(role));
        }
        assert_eq!(PredefinedRole::from_id("nurse"), None);
    }
}
