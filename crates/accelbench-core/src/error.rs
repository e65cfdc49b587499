//! Error taxonomy for a benchmark run.
//!
//! Every failure is fatal; nothing here is retried.

use std::path::PathBuf;
use std::time::Duration;

use accelbench_backend::BackendError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;

/// Adapter selection failures.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The device-discovery library could not be loaded.
    #[error("device discovery is unavailable")]
    EnumerationUnavailable(#[source] BackendError),

    /// Discovery loaded but listing adapters failed.
    #[error("adapter enumeration failed")]
    EnumerationFailed(#[source] BackendError),

    /// Enumeration succeeded but nothing passed the compute filter.
    #[error("no compute-capable adapter found ({enumerated} enumerated)")]
    NoSuitableAdapter { enumerated: usize },
}

/// Device, queue or accelerator-context creation failed.
///
/// Nothing created before the failing step survives it.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("device runtime is unavailable")]
    DeviceUnavailable(#[source] BackendError),

    #[error("failed to create device on adapter `{adapter}`")]
    Device {
        adapter: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to create compute queue")]
    Queue(#[source] BackendError),

    #[error("accelerator runtime is unavailable")]
    ContextUnavailable(#[source] EngineError),

    #[error("failed to create accelerator execution context")]
    Context(#[source] EngineError),
}

impl ProvisionError {
    /// A library could not be loaded at all, as opposed to a call failing.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_) | Self::ContextUnavailable(_))
    }
}

/// Fence signalling and waiting failures.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fence value {requested} does not advance past last signaled value {last}")]
    NonMonotonic { last: u64, requested: u64 },

    #[error("fence did not reach {target} within {timeout:?} (completed {completed})")]
    Timeout { target: u64, completed: u64, timeout: Duration },

    #[error("failed to signal fence")]
    Signal(#[source] BackendError),
}

/// Top-level benchmark error.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("device discovery is unavailable")]
    EnumerationUnavailable(#[source] BackendError),

    #[error("adapter enumeration failed")]
    EnumerationFailed(#[source] BackendError),

    #[error("no suitable accelerator found ({enumerated} compute-capable adapters enumerated)")]
    NoSuitableAdapter { enumerated: usize },

    #[error("accelerator provisioning failed")]
    Provision(#[from] ProvisionError),

    #[error("failed to load model {}", .path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("failed to bind accelerator tensors")]
    Binding(#[source] EngineError),

    #[error("inference submission failed before fence value {fence_value}")]
    Submission {
        fence_value: u64,
        #[source]
        source: EngineError,
    },

    #[error("fence {target} not reached within {timeout:?} (completed {completed})")]
    SyncTimeout { target: u64, completed: u64, timeout: Duration },

    #[error("fence synchronisation failed")]
    Sync(#[source] SyncError),
}

impl BenchError {
    /// No usable accelerator: discovery missing, failing or empty.
    pub fn is_no_accelerator(&self) -> bool {
        matches!(
            self,
            Self::EnumerationUnavailable(_)
                | Self::EnumerationFailed(_)
                | Self::NoSuitableAdapter { .. }
        )
    }
}

impl From<SelectionError> for BenchError {
    fn from(e: SelectionError) -> Self {
        match e {
            SelectionError::EnumerationUnavailable(e) => Self::EnumerationUnavailable(e),
            SelectionError::EnumerationFailed(e) => Self::EnumerationFailed(e),
            SelectionError::NoSuitableAdapter { enumerated } => {
                Self::NoSuitableAdapter { enumerated }
            }
        }
    }
}

impl From<SyncError> for BenchError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Timeout { target, completed, timeout } => {
                Self::SyncTimeout { target, completed, timeout }
            }
            other => Self::Sync(other),
        }
    }
}
