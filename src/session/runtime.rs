//! Runtime-only per-session state
//!
//! None of this is persisted: a loading flag or an abort handle cannot
//! outlive the process that created it.

use tokio_util::sync::CancellationToken;

/// Cancellation handle for one in-flight request
///
/// Cloning shares the underlying token, so the orchestrator can hold a copy
/// while the store keeps the owning one.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    /// Create a fresh, live handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the request; idempotent
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// True once `abort` has been called
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token observed by the stream reader
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Transient state kept next to each persisted session
#[derive(Debug, Clone, Default)]
pub struct SessionRuntime {
    /// True while a stream writes to the session
    pub loading: bool,
    /// Handle for the in-flight request, if any
    pub abort_handle: Option<AbortHandle>,
}
