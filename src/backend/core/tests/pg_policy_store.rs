//! Postgres policy store and ownership lookup.
//!
//! Requires a disposable database:
//! `DATABASE_URL=postgres://... cargo test --test pg_policy_store -- --ignored`

use std::sync::Arc;

use carehub_core::{
    config::{DatabaseConfig, OwnedResourceConfig},
    ownership::{Owner, OwnershipLookup, PgOwnershipLookup},
    policy::{IdentityId, PgPolicyStore, PolicyFact, PolicyStore, RoleQuery, TenantId},
    rbac::{Enforcer, PredefinedRole},
};
use uuid::Uuid;

async fn store() -> PgPolicyStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for Postgres tests");
    let store = PgPolicyStore::connect(&DatabaseConfig::with_url(url)).await.unwrap();
    store.migrate().await.unwrap();
    store
}

/// Isolates each test's rows.
fn fresh_tenant() -> String {
    format!("provider-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore]
async fn test_insert_is_idempotent_and_queryable() {
    let store = store().await;
    let tenant = fresh_tenant();
    let fact = PolicyFact::grouping("u1", "administrator", &tenant);

    store.insert(&fact).await.unwrap();
    store.insert(&fact).await.unwrap();

    let facts = store.query(&RoleQuery::roles_of("u1", &tenant)).await.unwrap();
    assert_eq!(facts, vec![fact.clone()]);

    store.remove(&fact).await.unwrap();
    store.remove(&fact).await.unwrap();
    assert!(store.query(&RoleQuery::roles_of("u1", &tenant)).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_empty_positions_are_wildcards() {
    let store = store().await;
    let tenant = fresh_tenant();
    for (subject, role) in [("u1", "caregiver"), ("u2", "caregiver"), ("u3", "billing")] {
        store.insert(&PolicyFact::grouping(subject, role, &tenant)).await.unwrap();
    }
    store
        .insert(&PolicyFact::grouping("u1", "administrator", fresh_tenant()))
        .await
        .unwrap();

    let all = store.query(&RoleQuery::tenant(&tenant)).await.unwrap();
    assert_eq!(all.len(), 3);

    let caregivers = store
        .query(&RoleQuery::tenant(&tenant).with_role("caregiver"))
        .await
        .unwrap();
    let subjects: Vec<_> = caregivers.iter().map(PolicyFact::subject).collect();
    assert_eq!(subjects, vec!["u1", "u2"]);
}

#[tokio::test]
#[ignore]
async fn test_enforcer_over_postgres() {
    let store = store().await;
    let tenant = fresh_tenant();
    store
        .insert(&PolicyFact::grouping("u9", "lead", &tenant))
        .await
        .unwrap();
    store
        .insert(&PolicyFact::grouping("lead", "coordinator", &tenant))
        .await
        .unwrap();

    let enforcer = Enforcer::new(Arc::new(store), PredefinedRole::default_capabilities());
    let tenant = TenantId::new(tenant);
    let user = IdentityId::new("u9");

    assert!(enforcer.allowed(&user, &tenant, "appointment", "create").await.unwrap());
    assert!(!enforcer.allowed(&user, &tenant, "invoice", "read").await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_ownership_lookup_reads_tenant_column() {
    let store = store().await;
    let pool = store.pool().clone();
    let table = format!("patients_{}", Uuid::new_v4().simple());

    sqlx::query(&format!("CREATE TABLE {} (id TEXT PRIMARY KEY, provider_id TEXT)", table))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(&format!(
        "INSERT INTO {} (id, provider_id) VALUES ('r1', 'providerX'), ('r2', NULL)",
        table
    ))
    .execute(&pool)
    .await
    .unwrap();

    let lookup = PgOwnershipLookup::new(pool.clone(), &OwnedResourceConfig::new("patient", &table)).unwrap();

    assert_eq!(
        lookup.owner_of("r1").await.unwrap(),
        Some(Owner::Tenant(TenantId::new("providerX")))
    );
    assert_eq!(lookup.owner_of("r2").await.unwrap(), Some(Owner::Unassigned));
    assert_eq!(lookup.owner_of("missing").await.unwrap(), None);

    sqlx::query(&format!("DROP TABLE {}", table))
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unsafe_table_name_is_rejected() {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .unwrap();
    let config = OwnedResourceConfig::new("patient", "patients; DROP TABLE patients");
    assert!(PgOwnershipLookup::new(pool, &config).is_err());
}
