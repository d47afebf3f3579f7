//! Policy fact storage.
//!
//! - **Model**: `PolicyFact`, `RoleQuery` and the identifier newtypes
//! - **Store**: the `PolicyStore` contract shared by every backend
//! - **Backends**: in-memory (tests, dev) and Postgres (production)
//!
//! The store is always passed explicitly as an `Arc<dyn PolicyStore>`; there
//! is no process-wide adapter.

pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use memory::InMemoryPolicyStore;
pub use model::{IdentityId, PolicyFact, PolicyKind, RoleName, RoleQuery, TenantId};
pub use postgres::PgPolicyStore;
pub use store::{PolicyStore, StoreError, StoreResult};
