//! Shared test doubles for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use brrtprobe::client::{ApiError, ApiOperation, ApiResponse, CallContext, Session, TargetApi};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory target whose latency depends on the load level of the calling iteration.
///
/// Calls tagged with a level below `slow_from` take `fast`; the rest take `slow`.
pub struct LevelLatencyTarget {
    pub slow_from: usize,
    pub fast: Duration,
    pub slow: Duration,
    pub fail_preflight: bool,
    pub preflights: AtomicUsize,
    pub logins: AtomicUsize,
    pub contexts: Mutex<Vec<CallContext>>,
}

impl LevelLatencyTarget {
    pub fn new(slow_from: usize, fast: Duration, slow: Duration) -> Self {
        Self {
            slow_from,
            fast,
            slow,
            fail_preflight: false,
            preflights: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Same latency at every level.
    pub fn flat(latency: Duration) -> Self {
        Self::new(usize::MAX, latency, latency)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::Relaxed)
    }

    async fn respond(&self, ctx: &CallContext) {
        self.contexts.lock().push(*ctx);
        let delay = if ctx.load_level.get() < self.slow_from {
            self.fast
        } else {
            self.slow
        };
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl TargetApi for LevelLatencyTarget {
    async fn preflight(&self) -> Result<(), ApiError> {
        self.preflights.fetch_add(1, Ordering::Relaxed);
        if self.fail_preflight {
            Err(ApiError::Rejected { status: 503 })
        } else {
            Ok(())
        }
    }

    async fn authenticate(&self, ctx: &CallContext) -> Result<Session, ApiError> {
        self.logins.fetch_add(1, Ordering::Relaxed);
        self.respond(ctx).await;
        Ok(Session {
            token: Some(format!("vu-{}-{}", ctx.vu_id, ctx.iteration)),
        })
    }

    async fn verify_session(
        &self,
        ctx: &CallContext,
        _session: &Session,
    ) -> Result<ApiResponse, ApiError> {
        self.respond(ctx).await;
        Ok(ApiResponse::new(200))
    }

    async fn call(
        &self,
        ctx: &CallContext,
        _session: &Session,
        _op: &ApiOperation,
    ) -> Result<ApiResponse, ApiError> {
        self.respond(ctx).await;
        Ok(ApiResponse::new(200))
    }

    async fn logout(&self, ctx: &CallContext, _session: &Session) -> Result<ApiResponse, ApiError> {
        self.respond(ctx).await;
        Ok(ApiResponse::new(200))
    }
}
