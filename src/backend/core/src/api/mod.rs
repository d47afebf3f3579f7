//! HTTP surface.
//!
//! Every `/api/v1` route is a [`Pipeline`] built once here and mounted as a
//! service. `/health` and `/metrics` are unauthenticated.

pub mod handlers;

use axum::{
    error_handling::HandleErrorLayer,
    response::{IntoResponse, Response},
    routing::{get, get_service},
    BoxError, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower::{timeout::error::Elapsed, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::error::CarehubError;
use crate::identity::IdentityResolver;
use crate::ownership::ResourceOwnershipChecker;
use crate::pipeline::Pipeline;
use crate::rbac::Enforcer;

/// Application state shared across routes.
#[derive(Clone)]
pub struct AppState {
    pub enforcer: Enforcer,
    pub resolver: Arc<dyn IdentityResolver>,
    pub ownership: Arc<ResourceOwnershipChecker>,
    pub metrics: Option<PrometheusHandle>,
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
}

impl AppState {
    pub fn new(
        enforcer: Enforcer,
        resolver: Arc<dyn IdentityResolver>,
        ownership: ResourceOwnershipChecker,
        server: &ServerConfig,
    ) -> Self {
        Self {
            enforcer,
            resolver,
            ownership: Arc::new(ownership),
            metrics: None,
            request_timeout: server.request_timeout,
            body_limit_bytes: server.body_limit_bytes,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route_service("/api/v1/me/roles", my_roles(&state))
        .route(
            "/api/v1/authz/check",
            get_service(check_from_query(&state)).post_service(check_from_body(&state)),
        );

    for kind in state.ownership.kinds() {
        router = router.route_service(&format!("/api/v1/access/{}/:id", kind), resource_access(&state, kind));
    }

    let timeout = state.request_timeout;
    router
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    timeout_error(err, timeout)
                }))
                .timeout(timeout),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Dropping the in-flight pipeline cancels it; the client still gets an envelope.
fn timeout_error(err: BoxError, after: Duration) -> Response {
    if err.is::<Elapsed>() {
        CarehubError::timeout(after).into_response()
    } else {
        CarehubError::internal(format!("unhandled middleware error: {}", err)).into_response()
    }
}

fn my_roles(state: &AppState) -> Pipeline {
    let enforcer = state.enforcer.clone();
    Pipeline::builder("me.roles")
        .authenticate(state.resolver.clone())
        .handler(move |ctx| handlers::my_roles(enforcer.clone(), ctx))
}

fn check_from_query(state: &AppState) -> Pipeline {
    let enforcer = state.enforcer.clone();
    Pipeline::builder("authz.check")
        .authenticate(state.resolver.clone())
        .validate_query::<handlers::CheckRequest>()
        .handler(move |ctx| handlers::check_access(enforcer.clone(), ctx))
}

fn check_from_body(state: &AppState) -> Pipeline {
    let enforcer = state.enforcer.clone();
    Pipeline::builder("authz.check")
        .authenticate(state.resolver.clone())
        .validate_json::<handlers::CheckRequest>(state.body_limit_bytes)
        .handler(move |ctx| handlers::check_access(enforcer.clone(), ctx))
}

fn resource_access(state: &AppState, kind: &str) -> Pipeline {
    Pipeline::builder(format!("access.{}", kind))
        .authenticate(state.resolver.clone())
        .authorize_role(state.enforcer.clone(), kind, "read")
        .authorize_resource(state.ownership.clone(), kind)
        .handler(handlers::resource_access)
}
