//! The compute backend capability.
//!
//! A backend is resolved once at startup and exposes the enumerate →
//! create-device → create-queue → submit/signal pipeline behind trait objects.
//! Everything returned here is owned by the caller and released on drop.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::fence::Fence;
use crate::types::{
    AdapterAttribute, AdapterDescriptor, DeviceBuffer, FeatureLevel, QueueKind, WorkItem,
};

/// Device discovery and device creation.
pub trait ComputeBackend: Send + Sync {
    /// Short backend name used in logs and reports.
    fn name(&self) -> &str;

    /// Enumerate adapters supporting every attribute in `filter`, in backend
    /// enumeration order.
    ///
    /// # Errors
    ///
    /// [`BackendError::Unavailable`](crate::BackendError::Unavailable) when the
    /// discovery library cannot be loaded; other variants when it loaded but
    /// enumeration failed.
    fn enumerate_adapters(&self, filter: &[AdapterAttribute]) -> Result<Vec<AdapterDescriptor>>;

    /// Create a logical device from `adapter` at no less than `min_level`.
    fn create_device(
        &self,
        adapter: &AdapterDescriptor,
        min_level: FeatureLevel,
    ) -> Result<Arc<dyn ComputeDevice>>;
}

/// A logical device created from one adapter.
pub trait ComputeDevice: Send + Sync + fmt::Debug {
    /// Opaque device handle.
    fn id(&self) -> u64;

    /// The adapter this device was created from.
    fn adapter(&self) -> &AdapterDescriptor;

    /// Feature level the device was created at.
    fn feature_level(&self) -> FeatureLevel;

    /// Create a command queue feeding the given engine.
    fn create_queue(&self, kind: QueueKind) -> Result<Arc<dyn CommandQueue>>;

    /// Create a timeline fence starting at `initial`.
    fn create_fence(&self, initial: u64) -> Result<Fence>;

    /// Allocate `len` bytes of accelerator-resident memory.
    fn allocate_buffer(&self, len: usize) -> Result<DeviceBuffer>;
}

/// An in-order queue of device work.
///
/// Both [`submit`](CommandQueue::submit) and [`signal`](CommandQueue::signal)
/// return as soon as the command is accepted; neither waits for the device.
pub trait CommandQueue: Send + Sync + fmt::Debug {
    /// Opaque queue handle.
    fn id(&self) -> u64;

    fn kind(&self) -> QueueKind;

    /// Enqueue a work item behind everything already submitted.
    fn submit(&self, work: WorkItem) -> Result<()>;

    /// Enqueue a completion marker: `fence` reaches `value` once every item
    /// submitted before this call has finished executing.
    fn signal(&self, fence: &Fence, value: u64) -> Result<()>;
}
