//! # Target API Boundary
//!
//! The probe never talks HTTP directly from its core. Everything it needs
//! from the system under test goes through [`TargetApi`]: a session lifecycle
//! (`authenticate` / `verify_session` / `logout`) and read operations on a
//! handful of business resources.
//!
//! [`HttpTargetApi`] is the production implementation on top of `reqwest`.
//! Tests plug in in-memory implementations with scripted latency and status
//! codes.
//!
//! Every call carries a [`CallContext`] identifying the VU, iteration and
//! load level it belongs to, so implementations can correlate requests on the
//! server side.

mod http;

pub use http::HttpTargetApi;

use crate::load::LoadLevel;
use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single call against the target.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("request rejected with status {status}")]
    Rejected { status: u16 },
}

/// Identity of the VU iteration issuing a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub vu_id: usize,
    pub iteration: u64,
    pub load_level: LoadLevel,
}

/// Authenticated session handle returned by [`TargetApi::authenticate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
}

/// Minimal view of a response: the status code and how much body came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body_bytes: usize,
}

impl ApiResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body_bytes: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Business resource namespaces exposed by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Profile,
    Documents,
    Contacts,
    Templates,
    Statistics,
    Configuration,
}

impl Resource {
    /// Path segment under the API prefix.
    pub fn segment(self) -> &'static str {
        match self {
            Resource::Profile => "/profile",
            Resource::Documents => "/documents",
            Resource::Contacts => "/contacts",
            Resource::Templates => "/templates",
            Resource::Statistics => "/statistics",
            Resource::Configuration => "/configuration",
        }
    }
}

/// A named read operation against one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiOperation {
    /// Name used to tag samples, e.g. `documents.list`.
    pub name: &'static str,
    pub resource: Resource,
    /// Path below the resource segment; empty for the collection itself.
    pub path: &'static str,
    pub query: &'static [(&'static str, &'static str)],
}

impl ApiOperation {
    /// Path below the API prefix, without query string.
    pub fn relative_path(&self) -> String {
        format!("{}{}", self.resource.segment(), self.path)
    }
}

/// The system under test.
#[async_trait]
pub trait TargetApi: Send + Sync {
    /// Reachability check run once before any VU starts.
    async fn preflight(&self) -> Result<(), ApiError> {
        Ok(())
    }

    /// Open a session. Non-2xx responses are reported as [`ApiError::Rejected`].
    async fn authenticate(&self, ctx: &CallContext) -> Result<Session, ApiError>;

    /// Check that the session is usable.
    async fn verify_session(
        &self,
        ctx: &CallContext,
        session: &Session,
    ) -> Result<ApiResponse, ApiError>;

    /// Execute one read operation.
    async fn call(
        &self,
        ctx: &CallContext,
        session: &Session,
        op: &ApiOperation,
    ) -> Result<ApiResponse, ApiError>;

    /// Close the session.
    async fn logout(&self, ctx: &CallContext, session: &Session) -> Result<ApiResponse, ApiError>;
}
