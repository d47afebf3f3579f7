#![allow(clippy::result_large_err)]
//! # Carehub Core
//!
//! Tenant-scoped authorization and request dispatch for the Carehub care
//! operations API.
//!
//! ## Architecture
//!
//! - **Policy**: grouping facts `(subject, role, tenant)` in a pluggable store
//! - **RBAC**: enforcer resolving role hierarchies against a static capability table
//! - **Identity**: bearer-token resolution of the caller and their tenant
//! - **Ownership**: per-resource-kind checks that an instance belongs to the caller's tenant
//! - **Pipeline**: ordered, short-circuiting request steps ending in a business handler
//! - **Envelope**: one success/error response shape for every route
//! - **Telemetry**: structured logging, OTLP export and Prometheus metrics

pub mod api;
pub mod config;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod ownership;
pub mod pipeline;
pub mod policy;
pub mod rbac;
pub mod telemetry;
pub mod validation;

pub use error::{CarehubError, ErrorKind, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::envelope::ResponseEnvelope;
    pub use crate::error::{CarehubError, ErrorKind, Result};
    pub use crate::identity::{Identity, IdentityResolver, JwtIdentityResolver};
    pub use crate::ownership::{Owner, OwnershipLookup, ResourceOwnershipChecker, ResourceRef};
    pub use crate::pipeline::{HandlerReply, Outcome, Pipeline, PipelineStep, RequestContext, Stage};
    pub use crate::policy::{IdentityId, PolicyFact, PolicyStore, RoleName, RoleQuery, TenantId};
    pub use crate::rbac::{CapabilityTable, Enforcer, PolicyDecision, PredefinedRole};
}
