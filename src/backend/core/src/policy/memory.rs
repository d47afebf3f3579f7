//! In-memory policy store for tests, local development and benchmarks.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use super::model::{PolicyFact, RoleQuery};
use super::store::{ensure_complete, PolicyStore, StoreResult};

/// Facts kept in insertion order so query results are stable.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicyStore {
    facts: Arc<RwLock<Vec<PolicyFact>>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with facts (duplicates and incomplete facts are dropped).
    pub fn with_facts(facts: impl IntoIterator<Item = PolicyFact>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.facts.write();
            for fact in facts {
                if fact.is_complete() && !guard.contains(&fact) {
                    guard.push(fact);
                }
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.facts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.read().is_empty()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn insert(&self, fact: &PolicyFact) -> StoreResult<()> {
        ensure_complete(fact)?;
        let mut facts = self.facts.write();
        if !facts.contains(fact) {
            facts.push(fact.clone());
        }
        Ok(())
    }

    async fn remove(&self, fact: &PolicyFact) -> StoreResult<()> {
        self.facts.write().retain(|existing| existing != fact);
        Ok(())
    }

    async fn query(&self, filter: &RoleQuery) -> StoreResult<Vec<PolicyFact>> {
        Ok(self
            .facts
            .read()
            .iter()
            .filter(|fact| filter.matches(fact))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::StoreError;

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = InMemoryPolicyStore::new();
        let fact = PolicyFact::grouping("u1", "caregiver", "providerX");

        store.insert(&fact).await.unwrap();
        let once = store.query(&RoleQuery::roles_of("u1", "providerX")).await.unwrap();
        store.insert(&fact).await.unwrap();
        let twice = store.query(&RoleQuery::roles_of("u1", "providerX")).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let store = InMemoryPolicyStore::with_facts([PolicyFact::grouping("u1", "caregiver", "providerX")]);
        store
            .remove(&PolicyFact::grouping("u9", "caregiver", "providerX"))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_empty_position() {
        let store = InMemoryPolicyStore::new();

        let err = store
            .insert(&PolicyFact::grouping("", "administrator", "providerX"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IncompleteFact(_)));
        assert!(store
            .insert(&PolicyFact::grouping("u1", "", "providerX"))
            .await
            .is_err());
        assert!(store.is_empty());

        let seeded = InMemoryPolicyStore::with_facts([PolicyFact::grouping("u1", "caregiver", "")]);
        assert!(seeded.is_empty());
    }

    #[tokio::test]
    async fn test_query_filters_by_tenant() {
        let store = InMemoryPolicyStore::with_facts([
            PolicyFact::grouping("u1", "caregiver", "providerX"),
            PolicyFact::grouping("u1", "administrator", "providerY"),
            PolicyFact::grouping("u2", "billing", "providerX"),
        ]);

        let x = store.query(&RoleQuery::roles_of("u1", "providerX")).await.unwrap();
        assert_eq!(x, vec![PolicyFact::grouping("u1", "caregiver", "providerX")]);

        let all_x = store.query(&RoleQuery::tenant("providerX")).await.unwrap();
        assert_eq!(all_x.len(), 2);
    }

    #[tokio::test]
    async fn test_query_order_is_insertion_order() {
        let store = InMemoryPolicyStore::new();
        for role in ["billing", "caregiver", "administrator"] {
            store
                .insert(&PolicyFact::grouping("u1", role, "providerX"))
                .await
                .unwrap();
        }

        let roles: Vec<String> = store
            .query(&RoleQuery::roles_of("u1", "providerX"))
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.role().to_string())
            .collect();
        assert_eq!(roles, vec!["billing", "caregiver", "administrator"]);
    }
}
