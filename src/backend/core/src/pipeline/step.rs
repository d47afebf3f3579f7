//! The step contract.

use async_trait::async_trait;
use axum::response::Response;
use std::fmt;

use super::context::RequestContext;
use crate::error::Result;

/// Pipeline state a step runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Authenticating,
    RoleChecking,
    ResourceChecking,
    Validating,
    Handling,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticating => "authenticating",
            Self::RoleChecking => "role_checking",
            Self::ResourceChecking => "resource_checking",
            Self::Validating => "validating",
            Self::Handling => "handling",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step decided.
pub enum Outcome {
    /// Advance with the (possibly augmented) context.
    Continue(RequestContext),
    /// Stop here and send this response.
    Terminate(Response),
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue(ctx) => f.debug_tuple("Continue").field(ctx).finish(),
            Self::Terminate(response) => f.debug_tuple("Terminate").field(&response.status()).finish(),
        }
    }
}

/// One stage of request processing.
///
/// Steps are built once per route and shared by every request on it, so
/// they must not keep per-request state. An `Err` terminates the pipeline
/// with the matching error envelope.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn stage(&self) -> Stage;

    async fn run(&self, ctx: RequestContext) -> Result<Outcome>;
}
