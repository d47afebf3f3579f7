//! Caller identity.
//!
//! The core never inspects credentials itself. An [`IdentityResolver`] turns
//! the request head into an [`Identity`] or reports that the caller is
//! unauthenticated; the pipeline resolves once per request and keeps the
//! result in the request context.

pub mod jwt;

use async_trait::async_trait;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::policy::{IdentityId, TenantId};

pub use jwt::{Claims, JwtIdentityResolver};

/// Authenticated caller. Immutable for the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: IdentityId,
    /// The only source of the tenant for authorization decisions.
    pub tenant_id: TenantId,
    /// Roles asserted by the credential. Informational; authorization uses
    /// the policy store.
    pub role_claims: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(id: impl Into<IdentityId>, tenant_id: impl Into<TenantId>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            role_claims: Vec::new(),
            expires_at: None,
        }
    }

    pub fn with_role_claims(mut self, roles: Vec<String>) -> Self {
        self.role_claims = roles;
        self
    }
}

/// Resolves the caller of a request.
///
/// `Ok(None)` means unauthenticated. `Err` is reserved for failures of the
/// resolver itself.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, parts: &Parts) -> Result<Option<Identity>>;
}
