//! Tenant-scoped role-based access control.
//!
//! This module provides:
//! - **Capability table**: static allowlist of roles per `(resource kind, action)`
//! - **Predefined roles**: administrator, caregiver, coordinator, billing
//! - **Enforcer**: resolves effective roles from the policy store and decides
//!
//! # Usage
//!
//! ```rust,ignore
//! use carehub_core::rbac::{Enforcer, PredefinedRole};
//!
//! let enforcer = Enforcer::new(store, PredefinedRole::default_capabilities());
//! let ok = enforcer.allowed(&user, &tenant, "patient", "read").await?;
//! ```

pub mod capability;
pub mod enforcer;
pub mod roles;

pub use capability::{CapabilityTable, ANY_ACTION};
pub use enforcer::{Enforcer, PolicyDecision, DEFAULT_MAX_ROLE_DEPTH};
pub use roles::{PredefinedRole, RESOURCE_KINDS};
