//! Resource ownership checks.
//!
//! Role membership says what a caller may do to a *kind* of resource; it says
//! nothing about whether a particular instance belongs to the caller's tenant.
//! [`ResourceOwnershipChecker`] answers that second question by asking a
//! per-kind [`OwnershipLookup`] for the owning tenant and comparing it with
//! the identity's tenant.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use metrics::counter;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::CarehubError;
use crate::identity::Identity;
use crate::policy::{StoreError, StoreResult, TenantId};

pub use memory::InMemoryOwnershipLookup;
pub use postgres::PgOwnershipLookup;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier regex"));

/// Reject anything that is not a plain lowercase SQL identifier.
pub fn validate_identifier(value: &str) -> Result<(), String> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(format!("invalid SQL identifier: {:?}", value))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum OwnershipError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("no ownership lookup registered for resource kind {0}")]
    UnknownKind(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<OwnershipError> for CarehubError {
    fn from(error: OwnershipError) -> Self {
        match error {
            OwnershipError::NotFound { kind, id } => CarehubError::not_found(kind, id),
            OwnershipError::UnknownKind(kind) => CarehubError::internal(format!(
                "no ownership lookup registered for resource kind {}",
                kind
            )),
            OwnershipError::Storage(e) => e.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lookup
// ═══════════════════════════════════════════════════════════════════════════════

/// Recorded owner of an existing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Tenant(TenantId),
    /// The resource names no tenant. It belongs to no caller.
    Unassigned,
}

impl Owner {
    /// Maps a missing or empty tenant value to [`Owner::Unassigned`].
    pub fn from_column(tenant: Option<String>) -> Self {
        match tenant {
            Some(tenant) if !tenant.is_empty() => Self::Tenant(TenantId::new(tenant)),
            _ => Self::Unassigned,
        }
    }

    /// The owning tenant, if it is `tenant`. An empty `tenant` never matches.
    fn matching(self, tenant: &TenantId) -> Option<TenantId> {
        match self {
            Self::Tenant(owner) if !tenant.as_str().is_empty() && owner == *tenant => Some(owner),
            _ => None,
        }
    }
}

/// Data-access call returning the owner of one resource kind.
#[async_trait]
pub trait OwnershipLookup: Send + Sync {
    /// `None` when the resource does not exist.
    async fn owner_of(&self, resource_id: &str) -> StoreResult<Option<Owner>>;
}

/// A resource instance addressed by a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    pub kind: String,
    pub id: String,
    /// Owning tenant, once verified.
    pub tenant_id: TenantId,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Checker
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
pub struct ResourceOwnershipChecker {
    lookups: HashMap<String, Arc<dyn OwnershipLookup>>,
}

impl std::fmt::Debug for ResourceOwnershipChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceOwnershipChecker")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ResourceOwnershipChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the lookup for `kind`.
    pub fn register(mut self, kind: impl Into<String>, lookup: Arc<dyn OwnershipLookup>) -> Self {
        self.lookups.insert(kind.into(), lookup);
        self
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.lookups.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn handles(&self, kind: &str) -> bool {
        self.lookups.contains_key(kind)
    }

    /// Whether `identity`'s tenant owns `kind/resource_id`.
    ///
    /// A missing resource is `NotFound`, never `Ok(false)`.
    pub async fn owns(&self, identity: &Identity, kind: &str, resource_id: &str) -> Result<bool, OwnershipError> {
        Ok(self.resolve(identity, kind, resource_id).await?.is_some())
    }

    /// Like [`owns`](Self::owns), returning the verified resource.
    pub async fn resolve(
        &self,
        identity: &Identity,
        kind: &str,
        resource_id: &str,
    ) -> Result<Option<ResourceRef>, OwnershipError> {
        let lookup = self
            .lookups
            .get(kind)
            .ok_or_else(|| OwnershipError::UnknownKind(kind.to_string()))?;

        let owner = match lookup.owner_of(resource_id).await {
            Ok(owner) => owner,
            Err(e) => {
                record(kind, "error");
                return Err(e.into());
            }
        };

        let Some(owner) = owner else {
            record(kind, "not_found");
            return Err(OwnershipError::NotFound {
                kind: kind.to_string(),
                id: resource_id.to_string(),
            });
        };

        if let Some(tenant_id) = owner.matching(&identity.tenant_id) {
            record(kind, "owned");
            debug!(identity = %identity.id, resource_kind = kind, resource_id, "Ownership verified");
            Ok(Some(ResourceRef {
                kind: kind.to_string(),
                id: resource_id.to_string(),
                tenant_id,
            }))
        } else {
            record(kind, "foreign");
            warn!(
                identity = %identity.id,
                tenant = %identity.tenant_id,
                resource_kind = kind,
                resource_id,
                "Resource belongs to another tenant"
            );
            Ok(None)
        }
    }
}

fn record(kind: &str, outcome: &'static str) {
    counter!(
        "carehub_ownership_checks_total",
        "resource" => kind.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct DownLookup;

    #[async_trait]
    impl OwnershipLookup for DownLookup {
        async fn owner_of(&self, _resource_id: &str) -> StoreResult<Option<Owner>> {
            Err(StoreError::Unavailable("timeout".into()))
        }
    }

    fn checker() -> ResourceOwnershipChecker {
        let patients = InMemoryOwnershipLookup::new();
        patients.insert("r1", "providerX");
        patients.insert_unassigned("r2");
        ResourceOwnershipChecker::new().register("patient", Arc::new(patients))
    }

    #[tokio::test]
    async fn test_owner_tenant_owns() {
        let identity = Identity::new("u1", "providerX");
        assert!(checker().owns(&identity, "patient", "r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_other_tenant_does_not_own() {
        let identity = Identity::new("u3", "providerZ");
        assert!(!checker().owns(&identity, "patient", "r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unassigned_resource_is_owned_by_nobody() {
        for tenant in ["providerX", ""] {
            let identity = Identity::new("u1", tenant);
            assert!(!checker().owns(&identity, "patient", "r2").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_empty_caller_tenant_owns_nothing() {
        let patients = InMemoryOwnershipLookup::new();
        patients.insert("r3", "");
        let checker = ResourceOwnershipChecker::new().register("patient", Arc::new(patients));

        let identity = Identity::new("u1", "");
        assert!(!checker.owns(&identity, "patient", "r3").await.unwrap());
    }

    #[test]
    fn test_owner_from_column() {
        assert_eq!(Owner::from_column(None), Owner::Unassigned);
        assert_eq!(Owner::from_column(Some(String::new())), Owner::Unassigned);
        assert_eq!(
            Owner::from_column(Some("providerX".into())),
            Owner::Tenant(TenantId::new("providerX"))
        );
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let identity = Identity::new("u1", "providerX");
        let err = checker().owns(&identity, "patient", "r404").await.unwrap_err();
        assert!(matches!(err, OwnershipError::NotFound { .. }));
        assert_eq!(CarehubError::from(err).kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_internal() {
        let identity = Identity::new("u1", "providerX");
        let err = checker().owns(&identity, "invoice", "i1").await.unwrap_err();
        assert!(matches!(err, OwnershipError::UnknownKind(_)));
        assert_eq!(CarehubError::from(err).kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_storage_error() {
        let checker = ResourceOwnershipChecker::new().register("patient", Arc::new(DownLookup));
        let identity = Identity::new("u1", "providerX");

        let err = checker.owns(&identity, "patient", "r1").await.unwrap_err();
        assert_eq!(CarehubError::from(err).kind(), ErrorKind::StorageError);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("patients").is_ok());
        assert!(validate_identifier("provider_id").is_ok());
        assert!(validate_identifier("Patients").is_err());
        assert!(validate_identifier("patients; drop").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("").is_err());
    }
}
