//! Ownership lookup over a tenant-scoped table.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{validate_identifier, Owner, OwnershipLookup};
use crate::config::OwnedResourceConfig;
use crate::policy::{StoreError, StoreResult};

/// Reads `tenant_column` of the row whose `id_column` equals the resource id.
#[derive(Debug, Clone)]
pub struct PgOwnershipLookup {
    pool: PgPool,
    sql: String,
}

impl PgOwnershipLookup {
    /// Identifiers are interpolated into SQL, so they are validated here.
    pub fn new(pool: PgPool, resource: &OwnedResourceConfig) -> StoreResult<Self> {
        for identifier in [&resource.table, &resource.id_column, &resource.tenant_column] {
            validate_identifier(identifier)
                .map_err(|e| StoreError::Unexpected(anyhow::anyhow!(e)))?;
        }

        // Both sides compared as text so uuid and text keys work alike.
        let sql = format!(
            "SELECT {tenant}::text FROM {table} WHERE {id}::text = $1 LIMIT 1",
            tenant = resource.tenant_column,
            table = resource.table,
            id = resource.id_column,
        );
        Ok(Self { pool, sql })
    }
}

#[async_trait]
impl OwnershipLookup for PgOwnershipLookup {
    async fn owner_of(&self, resource_id: &str) -> StoreResult<Option<Owner>> {
        let owner: Option<Option<String>> = sqlx::query_scalar(&self.sql)
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner.map(Owner::from_column))
    }
}
