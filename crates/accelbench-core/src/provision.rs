//! Device, queue and accelerator-context provisioning.

use std::sync::Arc;

use accelbench_backend::{
    AdapterDescriptor, CommandQueue, ComputeBackend, ComputeDevice, FeatureLevel, QueueKind,
};
use tracing::{debug, info};

use crate::engine::{AcceleratorContext, InferenceEngine};
use crate::error::ProvisionError;

/// Minimum feature level requested for every device.
pub const MIN_FEATURE_LEVEL: FeatureLevel = FeatureLevel::Core1_0;

/// Everything needed to run work on one accelerator.
///
/// Fields drop in declaration order: context, then queue, then device.
#[derive(Debug)]
pub struct ProvisionedAccelerator {
    context: AcceleratorContext,
    queue: Arc<dyn CommandQueue>,
    device: Arc<dyn ComputeDevice>,
    adapter: AdapterDescriptor,
}

impl ProvisionedAccelerator {
    pub fn adapter(&self) -> &AdapterDescriptor {
        &self.adapter
    }

    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<dyn CommandQueue> {
        &self.queue
    }

    pub fn context(&self) -> &AcceleratorContext {
        &self.context
    }
}

/// Creates the device, compute queue and accelerator context for an adapter.
pub struct DeviceProvisioner<'a> {
    backend: &'a dyn ComputeBackend,
    engine: &'a dyn InferenceEngine,
}

impl<'a> DeviceProvisioner<'a> {
    pub fn new(backend: &'a dyn ComputeBackend, engine: &'a dyn InferenceEngine) -> Self {
        Self { backend, engine }
    }

    /// All-or-nothing: on any failure, whatever was created so far is
    /// dropped before the error is returned.
    pub fn provision(
        &self,
        adapter: AdapterDescriptor,
    ) -> Result<ProvisionedAccelerator, ProvisionError> {
        let device = self.backend.create_device(&adapter, MIN_FEATURE_LEVEL).map_err(|source| {
            if source.is_unavailable() {
                ProvisionError::DeviceUnavailable(source)
            } else {
                ProvisionError::Device { adapter: adapter.name.clone(), source }
            }
        })?;
        debug!(device = device.id(), level = %device.feature_level(), "device created");

        let queue = device.create_queue(QueueKind::Compute).map_err(ProvisionError::Queue)?;
        debug!(queue = queue.id(), "compute queue created");

        let context = self
            .engine
            .create_accelerator_context(Arc::clone(&device), Arc::clone(&queue))
            .map_err(|e| {
                if e.is_unavailable() {
                    ProvisionError::ContextUnavailable(e)
                } else {
                    ProvisionError::Context(e)
                }
            })?;

        info!(adapter = %adapter.name, provider = context.provider(), "accelerator provisioned");
        Ok(ProvisionedAccelerator { context, queue, device, adapter })
    }
}
