//! Route handlers.
//!
//! Pipeline handlers take the request context after authentication and any
//! authorization steps have passed. `health` and `metrics` are plain axum
//! handlers outside any pipeline.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::AppState;
use crate::envelope::ResponseEnvelope;
use crate::error::{CarehubError, Result};
use crate::pipeline::{HandlerReply, RequestContext};
use crate::rbac::{Enforcer, PolicyDecision, RESOURCE_KINDS};
use crate::validation::{validate_field, MaxLength, OneOf, Required, Validate, ValidationErrors, ValidationResult};

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub policy_store: &'static str,
    pub timestamp: String,
}

pub async fn health(State(state): State<AppState>) -> Response {
    let store = state.enforcer.store();
    match store.health_check().await {
        Ok(()) => ResponseEnvelope::success(HealthStatus {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            policy_store: store.backend_name(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
        .into_response_with(StatusCode::OK),
        Err(e) => {
            warn!(error = %e, backend = store.backend_name(), "Policy store health check failed");
            ResponseEnvelope::<()>::error("Policy store unavailable", "STORAGE_ERROR")
                .into_response_with(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Roles
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub identity: String,
    pub tenant: String,
    pub roles: Vec<String>,
}

/// Effective roles of the caller in their own tenant.
pub async fn my_roles(enforcer: Enforcer, ctx: RequestContext) -> Result<HandlerReply> {
    let identity = ctx.require_identity()?;
    let roles = enforcer.roles_of(&identity.id, &identity.tenant_id).await?;

    HandlerReply::ok(RolesResponse {
        identity: identity.id.to_string(),
        tenant: identity.tenant_id.to_string(),
        roles: roles.into_iter().map(|r| r.0).collect(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorization check
// ═══════════════════════════════════════════════════════════════════════════════

/// `?resource=patient&action=read` or the same as a JSON body.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub action: String,
}

impl Validate for CheckRequest {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        validate_field("resource", &self.resource)
            .rule(Required)
            .rule(OneOf(&RESOURCE_KINDS))
            .collect_into(&mut errors);
        validate_field("action", &self.action)
            .rule(Required)
            .rule(MaxLength(32))
            .collect_into(&mut errors);
        errors.into_result()
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub resource: String,
    pub action: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<String>,
}

/// Whether the caller may perform an action, without performing it.
pub async fn check_access(enforcer: Enforcer, ctx: RequestContext) -> Result<HandlerReply> {
    let identity = ctx.require_identity()?;
    let request = ctx
        .payload::<CheckRequest>()
        .ok_or_else(|| CarehubError::internal("check route is missing its validation step"))?;

    let decision = enforcer
        .check(&identity.id, &identity.tenant_id, &request.resource, &request.action)
        .await?;

    HandlerReply::ok(CheckResponse {
        resource: request.resource.clone(),
        action: request.action.clone(),
        allowed: decision.is_allowed(),
        granted_by: match decision {
            PolicyDecision::Allow(role) => Some(role.0),
            PolicyDecision::Deny(_) => None,
        },
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource access
// ═══════════════════════════════════════════════════════════════════════════════

/// Reached only after role and ownership checks passed.
pub async fn resource_access(ctx: RequestContext) -> Result<HandlerReply> {
    let resource = ctx
        .resource()
        .ok_or_else(|| CarehubError::internal("access route is missing its ownership step"))?;
    Ok(HandlerReply::ok(resource)?.with_message("Access granted"))
}
