//! In-memory ownership lookup for tests and local development.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{Owner, OwnershipLookup};
use crate::policy::{StoreResult, TenantId};

/// Resource id to owner, for one resource kind.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOwnershipLookup {
    owners: Arc<DashMap<String, Owner>>,
}

impl InMemoryOwnershipLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty tenant is stored as [`Owner::Unassigned`].
    pub fn insert(&self, resource_id: impl Into<String>, tenant: impl Into<TenantId>) {
        let tenant: TenantId = tenant.into();
        self.owners
            .insert(resource_id.into(), Owner::from_column(Some(tenant.0)));
    }

    pub fn insert_unassigned(&self, resource_id: impl Into<String>) {
        self.owners.insert(resource_id.into(), Owner::Unassigned);
    }

    pub fn remove(&self, resource_id: &str) {
        self.owners.remove(resource_id);
    }
}

#[async_trait]
impl OwnershipLookup for InMemoryOwnershipLookup {
    async fn owner_of(&self, resource_id: &str) -> StoreResult<Option<Owner>> {
        Ok(self.owners.get(resource_id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let lookup = InMemoryOwnershipLookup::new();
        lookup.insert("r1", "providerX");

        let owner = tokio_test::block_on(lookup.owner_of("r1")).unwrap();
        assert_eq!(owner, Some(Owner::Tenant(TenantId::new("providerX"))));

        lookup.remove("r1");
        assert_eq!(tokio_test::block_on(lookup.owner_of("r1")).unwrap(), None);
    }

    #[test]
    fn test_clones_share_entries() {
        let lookup = InMemoryOwnershipLookup::new();
        let shared = lookup.clone();
        shared.insert("a1", "providerY");

        let owner = tokio_test::block_on(lookup.owner_of("a1")).unwrap();
        assert_eq!(owner, Some(Owner::Tenant(TenantId::new("providerY"))));
    }
}
