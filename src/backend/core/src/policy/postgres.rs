//! Postgres-backed policy store.
//!
//! Facts live in a single `policy_rules` table with a kind discriminator and
//! three positional string columns, so several named relations can share it:
//!
//! | ptype | v0                 | v1                 | v2     |
//! |-------|--------------------|--------------------|--------|
//! | `g`   | identity or role   | role or parent     | tenant |
//!
//! A unique index over `(ptype, v0, v1, v2)` makes `insert` idempotent via
//! `ON CONFLICT DO NOTHING`. Reads are ordered by the surrogate `id`, which
//! keeps results stable within one snapshot.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::model::{PolicyFact, PolicyKind, RoleQuery};
use super::store::{ensure_complete, PolicyStore, StoreError, StoreResult};
use crate::config::DatabaseConfig;

const COLUMNS: [&str; 3] = ["v0", "v1", "v2"];

#[derive(Debug, sqlx::FromRow)]
struct DbPolicyRule {
    ptype: String,
    v0: String,
    v1: String,
    v2: String,
}

impl From<DbPolicyRule> for PolicyFact {
    fn from(row: DbPolicyRule) -> Self {
        PolicyFact::new(PolicyKind::named(row.ptype), row.v0, row.v1, row.v2)
    }
}

/// Policy store over a shared `PgPool`.
#[derive(Debug, Clone)]
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool from configuration and wrap it.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unexpected(anyhow::Error::new(e)))
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn insert(&self, fact: &PolicyFact) -> StoreResult<()> {
        ensure_complete(fact)?;
        sqlx::query(
            "INSERT INTO policy_rules (ptype, v0, v1, v2) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT DO NOTHING",
        )
        .bind(fact.kind.as_str())
        .bind(&fact.fields[0])
        .bind(&fact.fields[1])
        .bind(&fact.fields[2])
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, fact: &PolicyFact) -> StoreResult<()> {
        sqlx::query("DELETE FROM policy_rules WHERE ptype = $1 AND v0 = $2 AND v1 = $3 AND v2 = $4")
            .bind(fact.kind.as_str())
            .bind(&fact.fields[0])
            .bind(&fact.fields[1])
            .bind(&fact.fields[2])
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(&self, filter: &RoleQuery) -> StoreResult<Vec<PolicyFact>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT ptype, v0, v1, v2 FROM policy_rules WHERE ptype = ");
        builder.push_bind(filter.kind.as_str().to_string());

        // Column names come from the fixed list above, values are bound.
        for (column, value) in COLUMNS.iter().zip(filter.positions()) {
            if !value.is_empty() {
                builder.push(format!(" AND {} = ", column));
                builder.push_bind(value.to_string());
            }
        }
        builder.push(" ORDER BY id");

        let rows: Vec<DbPolicyRule> = builder.build_query_as().fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), kind = %filter.kind, "Policy query");
        Ok(rows.into_iter().map(PolicyFact::from).collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
