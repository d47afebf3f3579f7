//! Policy enforcer.
//!
//! Answers "can identity I perform action A on resource kind K in tenant T?"
//! by resolving I's effective roles in T from the policy store and checking
//! them against the static [`CapabilityTable`].
//!
//! Roles are themselves subjects of grouping facts: `(R1, R2, T)` means R1
//! implies R2 within T. Expansion is breadth-first and bounded by
//! `max_depth`; a cycle or a chain deeper than the bound simply stops
//! expansion.
//!
//! The enforcer holds no policy state. Every resolution reads the store, so a
//! grant or revoke is visible to the next request.

use metrics::counter;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::capability::CapabilityTable;
use crate::error::{CarehubError, Result};
use crate::policy::{IdentityId, PolicyStore, RoleName, RoleQuery, StoreResult, TenantId};

/// Default bound on role hierarchy expansion.
pub const DEFAULT_MAX_ROLE_DEPTH: usize = 4;

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Allowed, with the role that granted it.
    Allow(RoleName),
    /// Denied, with a reason for the logs.
    Deny(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Allow(_) => "allow",
            Self::Deny(_) => "deny",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Enforcer
// ═══════════════════════════════════════════════════════════════════════════════

/// Cheap to clone; shared by every pipeline that checks roles.
#[derive(Clone)]
pub struct Enforcer {
    store: Arc<dyn PolicyStore>,
    capabilities: Arc<CapabilityTable>,
    max_depth: usize,
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("store", &self.store.backend_name())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Enforcer {
    pub fn new(store: Arc<dyn PolicyStore>, capabilities: CapabilityTable) -> Self {
        Self {
            store,
            capabilities: Arc::new(capabilities),
            max_depth: DEFAULT_MAX_ROLE_DEPTH,
        }
    }

    /// Override the hierarchy bound. Direct roles count as depth 1, so the
    /// bound is at least 1.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Role resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Roles assigned to `subject` in `tenant` by a single grouping fact,
    /// without hierarchy expansion. `subject` may be an identity or a role.
    ///
    /// An empty `subject` or `tenant` has no roles; neither is ever sent to
    /// the store, where it would act as a wildcard.
    pub async fn direct_roles_of(&self, subject: &str, tenant: &TenantId) -> StoreResult<BTreeSet<RoleName>> {
        if subject.is_empty() || tenant.as_str().is_empty() {
            return Ok(BTreeSet::new());
        }
        let facts = self
            .store
            .query(&RoleQuery::roles_of(subject, tenant.as_str()))
            .await?;
        Ok(facts
            .into_iter()
            .filter(|fact| !fact.role().is_empty())
            .map(|fact| RoleName::new(fact.role()))
            .collect())
    }

    /// Effective roles of `identity` in `tenant`, including implied roles.
    ///
    /// An empty set means the identity has no standing in the tenant.
    pub async fn roles_of(&self, identity: &IdentityId, tenant: &TenantId) -> StoreResult<BTreeSet<RoleName>> {
        if identity.as_str().is_empty() || tenant.as_str().is_empty() {
            debug!(identity = %identity, tenant = %tenant, "Empty identity or tenant has no roles");
            return Ok(BTreeSet::new());
        }

        let mut resolved = BTreeSet::new();
        let mut visited: HashSet<String> = HashSet::from([identity.as_str().to_string()]);
        let mut frontier = vec![identity.as_str().to_string()];

        for _ in 0..self.max_depth {
            let mut next = Vec::new();
            for subject in &frontier {
                for role in self.direct_roles_of(subject, tenant).await? {
                    if visited.insert(role.as_str().to_string()) {
                        next.push(role.as_str().to_string());
                    }
                    resolved.insert(role);
                }
            }
            if next.is_empty() {
                return Ok(resolved);
            }
            frontier = next;
        }

        debug!(
            identity = %identity,
            tenant = %tenant,
            max_depth = self.max_depth,
            unexpanded = ?frontier,
            "Role expansion stopped at depth bound"
        );
        Ok(resolved)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization checks
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluate whether `identity` may perform `action` on `resource_kind` in
    /// `tenant`. Store failures propagate; they are never a denial.
    pub async fn check(
        &self,
        identity: &IdentityId,
        tenant: &TenantId,
        resource_kind: &str,
        action: &str,
    ) -> StoreResult<PolicyDecision> {
        let roles = self.roles_of(identity, tenant).await?;

        let decision = if roles.is_empty() {
            PolicyDecision::Deny(format!("{} has no roles in tenant {}", identity, tenant))
        } else {
            match roles
                .iter()
                .find(|role| self.capabilities.permits(resource_kind, action, role.as_str()))
            {
                Some(role) => PolicyDecision::Allow(role.clone()),
                None => PolicyDecision::Deny(format!(
                    "roles {:?} do not grant {}:{}",
                    roles.iter().map(RoleName::as_str).collect::<Vec<_>>(),
                    resource_kind,
                    action
                )),
            }
        };

        counter!(
            "carehub_authz_decisions_total",
            "decision" => decision.label(),
            "resource" => resource_kind.to_string(),
            "action" => action.to_string()
        )
        .increment(1);

        match &decision {
            PolicyDecision::Allow(role) => debug!(
                identity = %identity,
                tenant = %tenant,
                resource_kind,
                action,
                granted_by = %role,
                "Permission granted"
            ),
            PolicyDecision::Deny(reason) => debug!(
                identity = %identity,
                tenant = %tenant,
                resource_kind,
                action,
                reason = %reason,
                "Permission denied"
            ),
        }

        Ok(decision)
    }

    /// `true` iff the effective roles intersect the allowlist.
    pub async fn allowed(
        &self,
        identity: &IdentityId,
        tenant: &TenantId,
        resource_kind: &str,
        action: &str,
    ) -> StoreResult<bool> {
        Ok(self
            .check(identity, tenant, resource_kind, action)
            .await?
            .is_allowed())
    }

    /// Like [`check`](Self::check) but as a `Result`: denial becomes
    /// `Forbidden`, a store failure becomes `StorageError`.
    pub async fn enforce(
        &self,
        identity: &IdentityId,
        tenant: &TenantId,
        resource_kind: &str,
        action: &str,
    ) -> Result<()> {
        match self.check(identity, tenant, resource_kind, action).await? {
            PolicyDecision::Allow(_) => Ok(()),
            PolicyDecision::Deny(reason) => Err(CarehubError::forbidden(format!(
                "You do not have permission: {}:{}",
                resource_kind, action
            ))
            .with_internal_message(reason)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
