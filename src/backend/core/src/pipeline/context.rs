//! Per-request state threaded through the pipeline steps.

use axum::{
    body::Body,
    extract::{FromRequestParts, Path, Request},
    http::{request::Parts, HeaderMap, Method, Uri},
};
use std::any::Any;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{CarehubError, Result};
use crate::identity::Identity;
use crate::ownership::ResourceRef;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Owned by exactly one in-flight request; never shared or reused.
pub struct RequestContext {
    parts: Parts,
    body: Option<Body>,
    request_id: String,
    path_params: HashMap<String, String>,
    identity: Option<Identity>,
    resource: Option<ResourceRef>,
    payload: Option<Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("request_id", &self.request_id)
            .field("path_params", &self.path_params)
            .field("identity", &self.identity)
            .field("resource", &self.resource)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

impl RequestContext {
    /// Split the request and pick up route parameters and the request id.
    pub async fn from_request(request: Request) -> Self {
        let (mut parts, body) = request.into_parts();

        // Absent when the pipeline is called outside a router.
        let path_params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();

        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            parts,
            body: Some(body),
            request_id,
            path_params,
            identity: None,
            resource: None,
            payload: None,
        }
    }

    pub fn parts(&self) -> &Parts {
        &self.parts
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// The body can be consumed once.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accumulated by steps
    // ─────────────────────────────────────────────────────────────────────────

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Identity for steps that cannot run without one. A missing identity
    /// fails closed as unauthenticated.
    pub fn require_identity(&self) -> Result<&Identity> {
        self.identity
            .as_ref()
            .ok_or_else(|| CarehubError::unauthenticated("Authentication required"))
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    pub fn resource(&self) -> Option<&ResourceRef> {
        self.resource.as_ref()
    }

    pub fn set_resource(&mut self, resource: ResourceRef) {
        self.resource = Some(resource);
    }

    pub fn set_payload<T: Send + Sync + 'static>(&mut self, payload: T) {
        self.payload = Some(Box::new(payload));
    }

    /// Validated payload, if one of type `T` was stored.
    pub fn payload<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.payload.as_ref().and_then(|p| p.downcast_ref::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let request = Request::builder()
            .uri("/api/v1/me/roles")
            .header(REQUEST_ID_HEADER, "req-42")
            .body(Body::empty())
            .unwrap();

        let ctx = RequestContext::from_request(request).await;
        assert_eq!(ctx.request_id(), "req-42");
    }

    #[tokio::test]
    async fn test_request_id_is_generated() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let ctx = RequestContext::from_request(request).await;
        assert!(Uuid::parse_str(ctx.request_id()).is_ok());
    }

    #[tokio::test]
    async fn test_payload_is_typed() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let mut ctx = RequestContext::from_request(request).await;

        ctx.set_payload(7u32);
        assert_eq!(ctx.payload::<u32>(), Some(&7));
        assert!(ctx.payload::<String>().is_none());
    }

    #[tokio::test]
    async fn test_missing_identity_fails_closed() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let ctx = RequestContext::from_request(request).await;
        let err = ctx.require_identity().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unauthenticated);
    }
}
