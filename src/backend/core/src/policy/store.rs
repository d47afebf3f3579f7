//! Policy store contract.

use async_trait::async_trait;
use thiserror::Error;

use super::model::{PolicyFact, RoleQuery};
use crate::error::CarehubError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("policy store unavailable: {0}")]
    Unavailable(String),
    #[error("policy fact has an empty position: {0}")]
    IncompleteFact(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(error.to_string())
            }
            other => Self::Unexpected(anyhow::Error::new(other)),
        }
    }
}

impl From<StoreError> for CarehubError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::IncompleteFact(_) => {
                CarehubError::validation("Subject, role and tenant must all be non-empty")
                    .with_internal_message(error.to_string())
            }
            other => CarehubError::storage(other.to_string()).with_source(other),
        }
    }
}

/// Writes refuse facts with an empty position.
pub fn ensure_complete(fact: &PolicyFact) -> StoreResult<()> {
    if fact.is_complete() {
        Ok(())
    } else {
        Err(StoreError::IncompleteFact(fact.to_string()))
    }
}

/// Durable storage of policy facts.
///
/// Every call goes to the backing store; implementations must not cache.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Insert a fact. Inserting an existing fact is a no-op; a fact with an
    /// empty position is rejected with [`StoreError::IncompleteFact`].
    async fn insert(&self, fact: &PolicyFact) -> StoreResult<()>;

    /// Remove a fact. Removing an absent fact is a no-op.
    async fn remove(&self, fact: &PolicyFact) -> StoreResult<()>;

    /// All facts whose non-wildcard positions match `filter`.
    async fn query(&self, filter: &RoleQuery) -> StoreResult<Vec<PolicyFact>>;

    async fn health_check(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}
