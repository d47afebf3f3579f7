//! Request pipeline.
//!
//! A [`Pipeline`] is an ordered sequence of [`PipelineStep`]s fixed at route
//! registration and reused for every request on that route:
//!
//! ```text
//! authenticate → authorize-role → authorize-resource → validate → handler
//! ```
//!
//! A route includes only the steps it needs; order is the caller's choice
//! and is not rearranged. Each step either continues with the context or
//! terminates. The first error is mapped to its error envelope and nothing
//! after it runs. A panicking step is reported as an internal error.
//!
//! `Pipeline` is a `tower::Service`, so it mounts directly on an axum router:
//!
//! ```rust,ignore
//! let read_patient = Pipeline::builder("patient.read")
//!     .authenticate(resolver.clone())
//!     .authorize_role(enforcer.clone(), "patient", "read")
//!     .authorize_resource(checker.clone(), "patient")
//!     .handler(|ctx| async move { HandlerReply::ok(ctx.resource()) });
//!
//! Router::new().route_service("/patients/:id", read_patient);
//! ```

pub mod context;
pub mod step;
pub mod steps;

use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use futures::future::{BoxFuture, FutureExt};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;
use tracing::{debug, error, info_span, Instrument};

pub use context::{RequestContext, REQUEST_ID_HEADER};
pub use step::{Outcome, PipelineStep, Stage};
pub use steps::{
    AuthenticateStep, AuthorizeResourceStep, AuthorizeRoleStep, HandlerReply, HandlerStep, PayloadSource,
    ValidateStep,
};

use crate::error::{CarehubError, Result};
use crate::identity::IdentityResolver;
use crate::ownership::ResourceOwnershipChecker;
use crate::rbac::Enforcer;
use crate::validation::Validate;

// ═══════════════════════════════════════════════════════════════════════════════
// Pipeline
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable once composed; clones share the same steps.
#[derive(Clone)]
pub struct Pipeline {
    name: Arc<str>,
    steps: Arc<[Arc<dyn PipelineStep>]>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages())
            .finish()
    }
}

impl Pipeline {
    /// Compose steps in the given order.
    pub fn compose(name: impl Into<String>, steps: Vec<Arc<dyn PipelineStep>>) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            steps: steps.into(),
        }
    }

    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.steps.iter().map(|step| step.stage()).collect()
    }

    /// Run a request through every step and produce the response.
    pub async fn run(&self, request: Request) -> Response {
        let started = Instant::now();
        let ctx = RequestContext::from_request(request).await;
        let request_id = ctx.request_id().to_string();

        let span = info_span!(
            "pipeline",
            route = %self.name,
            request_id = %request_id,
            method = %ctx.method(),
        );
        let mut response = self.execute(ctx).instrument(span).await;

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        histogram!(
            "carehub_pipeline_duration_seconds",
            "route" => self.name.to_string()
        )
        .record(started.elapsed().as_secs_f64());

        response
    }

    async fn execute(&self, mut ctx: RequestContext) -> Response {
        for step in self.steps.iter() {
            let stage = step.stage();
            let outcome = match AssertUnwindSafe(step.run(ctx)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let detail = panic_detail(panic.as_ref());
                    error!(route = %self.name, stage = %stage, panic = %detail, "Pipeline step panicked");
                    Err(CarehubError::internal(format!("{} step panicked: {}", stage, detail)))
                }
            };
            match outcome {
                Ok(Outcome::Continue(next)) => ctx = next,
                Ok(Outcome::Terminate(response)) => {
                    if stage != Stage::Handling {
                        self.record_termination(stage, response.status().as_str());
                    }
                    return response;
                }
                Err(err) => {
                    self.record_termination(stage, err.kind().as_str());
                    return err.into_response();
                }
            }
        }

        CarehubError::internal(format!("pipeline {} ended without a terminal handler", self.name))
            .into_response()
    }

    fn record_termination(&self, stage: Stage, code: &str) {
        debug!(route = %self.name, stage = %stage, code, "Pipeline terminated early");
        counter!(
            "carehub_pipeline_terminations_total",
            "stage" => stage.as_str(),
            "code" => code.to_string()
        )
        .increment(1);
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

impl Service<Request<Body>> for Pipeline {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, std::result::Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let pipeline = self.clone();
        Box::pin(async move { Ok(pipeline.run(request).await) })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Appends steps in call order.
pub struct PipelineBuilder {
    name: String,
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl PipelineBuilder {
    pub fn step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn authenticate(self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.step(AuthenticateStep::new(resolver))
    }

    pub fn authorize_role(self, enforcer: Enforcer, resource_kind: &str, action: &str) -> Self {
        self.step(AuthorizeRoleStep::new(enforcer, resource_kind, action))
    }

    /// Ownership of the resource named by the `:id` path parameter.
    pub fn authorize_resource(self, checker: Arc<ResourceOwnershipChecker>, resource_kind: &str) -> Self {
        self.step(AuthorizeResourceStep::new(checker, resource_kind))
    }

    pub fn validate_json<T>(self, limit: usize) -> Self
    where
        T: DeserializeOwned + Validate + Send + Sync + 'static,
    {
        self.step(ValidateStep::<T>::json(limit))
    }

    pub fn validate_query<T>(self) -> Self
    where
        T: DeserializeOwned + Validate + Send + Sync + 'static,
    {
        self.step(ValidateStep::<T>::query())
    }

    /// Finish with the terminal business handler.
    pub fn handler<F, Fut>(self, handler: F) -> Pipeline
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerReply>> + Send + 'static,
    {
        self.step(HandlerStep::new(handler)).build()
    }

    /// Finish without a handler; the last step is expected to terminate.
    pub fn build(self) -> Pipeline {
        Pipeline::compose(self.name, self.steps)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use async_trait::async_trait;
    use axum::http::{request::Parts, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolves `x-test-user: id@tenant`.
    struct HeaderResolver;

    #[async_trait]
    impl IdentityResolver for HeaderResolver {
        async fn resolve(&self, parts: &Parts) -> Result<Option<Identity>> {
            Ok(parts
                .headers
                .get("x-test-user")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split_once('@'))
                .map(|(id, tenant)| Identity::new(id, tenant)))
        }
    }

    struct Counting {
        stage: Stage,
        calls: Arc<AtomicUsize>,
        terminate: bool,
    }

    #[async_trait]
    impl PipelineStep for Counting {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn run(&self, ctx: RequestContext) -> Result<Outcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.terminate {
                Ok(Outcome::Terminate(StatusCode::ACCEPTED.into_response()))
            } else {
                Ok(Outcome::Continue(ctx))
            }
        }
    }

    fn counting(stage: Stage, terminate: bool) -> (Counting, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Counting {
                stage,
                calls: calls.clone(),
                terminate,
            },
            calls,
        )
    }

    fn request() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_terminate_skips_remaining_steps() {
        let (s1, c1) = counting(Stage::Authenticating, false);
        let (s2, c2) = counting(Stage::RoleChecking, true);
        let (s3, c3) = counting(Stage::ResourceChecking, false);
        let (s4, c4) = counting(Stage::Handling, true);

        let pipeline = Pipeline::builder("short-circuit")
            .step(s1)
            .step(s2)
            .step(s3)
            .step(s4)
            .build();

        let response = pipeline.run(request()).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
        assert_eq!(c3.load(Ordering::SeqCst), 0);
        assert_eq!(c4.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_skips_handler() {
        let (after, calls) = counting(Stage::Handling, true);
        let pipeline = Pipeline::builder("needs-auth")
            .authenticate(Arc::new(HeaderResolver))
            .step(after)
            .build();

        let response = pipeline.run(request()).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_sees_identity() {
        let pipeline = Pipeline::builder("whoami")
            .authenticate(Arc::new(HeaderResolver))
            .handler(|ctx| async move {
                let identity = ctx.require_identity()?;
                HandlerReply::created(identity.tenant_id.clone())
            });

        let request = Request::builder()
            .uri("/")
            .header("x-test-user", "u1@providerX")
            .header(REQUEST_ID_HEADER, "req-1")
            .body(Body::empty())
            .unwrap();
        let response = pipeline.run(request).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-1");
    }

    #[tokio::test]
    async fn test_missing_handler_is_internal_error() {
        let (only, _) = counting(Stage::Authenticating, false);
        let pipeline = Pipeline::builder("incomplete").step(only).build();

        let response = pipeline.run(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_handler_panic_is_internal_error() {
        let pipeline = Pipeline::builder("panics").handler(|_ctx| async move {
            if true {
                panic!("boom");
            }
            HandlerReply::ok(())
        });

        let response = pipeline.run(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    struct Exploding;

    #[async_trait]
    impl PipelineStep for Exploding {
        fn stage(&self) -> Stage {
            Stage::ResourceChecking
        }

        async fn run(&self, _ctx: RequestContext) -> Result<Outcome> {
            panic!("lookup table corrupted");
        }
    }

    #[tokio::test]
    async fn test_step_panic_is_internal_error() {
        let (after, calls) = counting(Stage::Handling, true);
        let pipeline = Pipeline::builder("exploding").step(Exploding).step(after).build();

        let response = pipeline.run(request()).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error_code"], "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_stages_keep_declared_order() {
        let pipeline = Pipeline::builder("public")
            .step(counting(Stage::Validating, false).0)
            .handler(|_ctx| async move { HandlerReply::ok("ok") });

        assert_eq!(pipeline.stages(), vec![Stage::Validating, Stage::Handling]);
    }
}
