//! Compute backend error types.

use thiserror::Error;

use crate::types::{FeatureLevel, QueueKind};

/// Errors produced by a [`ComputeBackend`](crate::ComputeBackend) and the
/// objects it creates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The library implementing this part of the backend could not be loaded.
    #[error("{library} could not be loaded: {reason}")]
    Unavailable { library: String, reason: String },

    /// The backend was loaded but the call itself failed.
    #[error("{call} failed: {message}")]
    CallFailed { call: &'static str, message: String },

    /// The adapter handle was not produced by this backend.
    #[error("adapter {0:#x} is not known to this backend")]
    UnknownAdapter(u64),

    /// The adapter cannot provide the requested minimum feature level.
    #[error("feature level {requested} not supported (adapter maximum is {supported})")]
    FeatureLevelUnsupported { requested: FeatureLevel, supported: FeatureLevel },

    /// The device does not expose a queue of this kind.
    #[error("{0} queues are not supported by this device")]
    UnsupportedQueueKind(QueueKind),

    /// The queue's device timeline has shut down.
    #[error("command queue is closed")]
    QueueClosed,

    /// A fence was asked to signal a value that does not advance its timeline.
    #[error("fence value {requested} does not advance past {previous}")]
    FenceRegression { previous: u64, requested: u64 },

    /// Not enough accelerator-resident memory left for the allocation.
    #[error("device allocation of {requested} bytes failed ({available} bytes available)")]
    OutOfDeviceMemory { requested: usize, available: usize },
}

impl BackendError {
    /// Shorthand for a failed call.
    pub fn call_failed(call: &'static str, message: impl Into<String>) -> Self {
        Self::CallFailed { call, message: message.into() }
    }

    /// Shorthand for a library that could not be loaded.
    pub fn unavailable(library: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable { library: library.into(), reason: reason.into() }
    }

    /// `true` when the backend (or one of its libraries) is missing entirely,
    /// as opposed to being present and returning a failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, BackendError>;
