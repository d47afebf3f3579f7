//! Built-in pipeline steps.

use async_trait::async_trait;
use axum::{
    body::to_bytes,
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::context::RequestContext;
use super::step::{Outcome, PipelineStep, Stage};
use crate::envelope::ResponseEnvelope;
use crate::error::{CarehubError, Result};
use crate::identity::IdentityResolver;
use crate::ownership::ResourceOwnershipChecker;
use crate::rbac::Enforcer;
use crate::validation::Validate;

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticate
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves the caller. Fails with `Unauthenticated` when there is none.
pub struct AuthenticateStep {
    resolver: Arc<dyn IdentityResolver>,
}

impl AuthenticateStep {
    pub fn new(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl PipelineStep for AuthenticateStep {
    fn stage(&self) -> Stage {
        Stage::Authenticating
    }

    async fn run(&self, mut ctx: RequestContext) -> Result<Outcome> {
        // Resolved at most once per request.
        if ctx.identity().is_some() {
            return Ok(Outcome::Continue(ctx));
        }

        match self.resolver.resolve(ctx.parts()).await? {
            Some(identity) => {
                debug!(
                    identity = %identity.id,
                    tenant = %identity.tenant_id,
                    request_id = ctx.request_id(),
                    "Identity resolved"
                );
                ctx.set_identity(identity);
                Ok(Outcome::Continue(ctx))
            }
            None => Err(CarehubError::unauthenticated("Authentication required")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorize role
// ═══════════════════════════════════════════════════════════════════════════════

/// Requires the caller's roles in their own tenant to allow `action` on
/// `resource_kind`.
pub struct AuthorizeRoleStep {
    enforcer: Enforcer,
    resource_kind: String,
    action: String,
}

impl AuthorizeRoleStep {
    pub fn new(enforcer: Enforcer, resource_kind: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            enforcer,
            resource_kind: resource_kind.into(),
            action: action.into(),
        }
    }
}

#[async_trait]
impl PipelineStep for AuthorizeRoleStep {
    fn stage(&self) -> Stage {
        Stage::RoleChecking
    }

    async fn run(&self, ctx: RequestContext) -> Result<Outcome> {
        let identity = ctx.require_identity()?;
        self.enforcer
            .enforce(&identity.id, &identity.tenant_id, &self.resource_kind, &self.action)
            .await?;
        Ok(Outcome::Continue(ctx))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorize resource
// ═══════════════════════════════════════════════════════════════════════════════

/// Requires the resource named by a path parameter to belong to the caller's
/// tenant. Stores the verified [`ResourceRef`](crate::ownership::ResourceRef).
pub struct AuthorizeResourceStep {
    checker: Arc<ResourceOwnershipChecker>,
    resource_kind: String,
    id_param: String,
}

impl AuthorizeResourceStep {
    pub fn new(checker: Arc<ResourceOwnershipChecker>, resource_kind: impl Into<String>) -> Self {
        Self {
            checker,
            resource_kind: resource_kind.into(),
            id_param: "id".to_string(),
        }
    }

    pub fn with_id_param(mut self, name: impl Into<String>) -> Self {
        self.id_param = name.into();
        self
    }
}

#[async_trait]
impl PipelineStep for AuthorizeResourceStep {
    fn stage(&self) -> Stage {
        Stage::ResourceChecking
    }

    async fn run(&self, mut ctx: RequestContext) -> Result<Outcome> {
        let identity = ctx.require_identity()?;
        let resource_id = ctx.path_param(&self.id_param).ok_or_else(|| {
            CarehubError::internal(format!(
                "route has no path parameter {:?} for {} ownership",
                self.id_param, self.resource_kind
            ))
        })?;

        match self
            .checker
            .resolve(identity, &self.resource_kind, resource_id)
            .await?
        {
            Some(resource) => {
                ctx.set_resource(resource);
                Ok(Outcome::Continue(ctx))
            }
            None => Err(CarehubError::forbidden(format!(
                "This {} does not belong to your organization",
                self.resource_kind
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Validate
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a payload is read from.
#[derive(Debug, Clone, Copy)]
pub enum PayloadSource {
    /// JSON body, read up to `limit` bytes.
    Json { limit: usize },
    Query,
}

/// Deserializes and validates a `T`, then stores it for
/// [`RequestContext::payload`].
pub struct ValidateStep<T> {
    source: PayloadSource,
    _payload: PhantomData<fn() -> T>,
}

impl<T> ValidateStep<T> {
    pub fn json(limit: usize) -> Self {
        Self {
            source: PayloadSource::Json { limit },
            _payload: PhantomData,
        }
    }

    pub fn query() -> Self {
        Self {
            source: PayloadSource::Query,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<T> PipelineStep for ValidateStep<T>
where
    T: DeserializeOwned + Validate + Send + Sync + 'static,
{
    fn stage(&self) -> Stage {
        Stage::Validating
    }

    async fn run(&self, mut ctx: RequestContext) -> Result<Outcome> {
        let payload: T = match self.source {
            PayloadSource::Json { limit } => {
                let body = ctx
                    .take_body()
                    .ok_or_else(|| CarehubError::internal("request body consumed before validation"))?;
                let bytes = to_bytes(body, limit).await.map_err(|e| {
                    CarehubError::validation("Request body could not be read")
                        .with_internal_message(e.to_string())
                })?;
                if bytes.is_empty() {
                    return Err(CarehubError::validation("Request body is required"));
                }
                serde_json::from_slice(&bytes)
                    .map_err(|e| CarehubError::validation(format!("Invalid JSON body: {}", e)))?
            }
            PayloadSource::Query => Query::<T>::try_from_uri(ctx.uri())
                .map(|Query(query)| query)
                .map_err(|e| CarehubError::validation(format!("Invalid query string: {}", e.body_text())))?,
        };

        payload.validate()?;
        ctx.set_payload(payload);
        Ok(Outcome::Continue(ctx))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Handler
// ═══════════════════════════════════════════════════════════════════════════════

/// Successful result of a business handler.
#[derive(Debug, Clone)]
pub struct HandlerReply {
    status: StatusCode,
    data: serde_json::Value,
    message: Option<String>,
}

impl HandlerReply {
    /// 200 with `data`.
    pub fn ok<T: Serialize>(data: T) -> Result<Self> {
        Self::with_status(StatusCode::OK, data)
    }

    /// 201 with `data`.
    pub fn created<T: Serialize>(data: T) -> Result<Self> {
        Self::with_status(StatusCode::CREATED, data)
    }

    pub fn with_status<T: Serialize>(status: StatusCode, data: T) -> Result<Self> {
        Ok(Self {
            status,
            data: serde_json::to_value(data)?,
            message: None,
        })
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HandlerReply {
    fn into_response(self) -> Response {
        let mut envelope = ResponseEnvelope::success(self.data);
        if let Some(message) = self.message {
            envelope = envelope.with_message(message);
        }
        envelope.into_response_with(self.status)
    }
}

type HandlerFn = dyn Fn(RequestContext) -> BoxFuture<'static, Result<HandlerReply>> + Send + Sync;

/// Terminal step wrapping the route's business logic.
pub struct HandlerStep {
    handler: Arc<HandlerFn>,
}

impl HandlerStep {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerReply>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |ctx| handler(ctx).boxed()),
        }
    }
}

#[async_trait]
impl PipelineStep for HandlerStep {
    fn stage(&self) -> Stage {
        Stage::Handling
    }

    async fn run(&self, ctx: RequestContext) -> Result<Outcome> {
        let reply = (self.handler)(ctx).await?;
        Ok(Outcome::Terminate(reply.into_response()))
    }
}
