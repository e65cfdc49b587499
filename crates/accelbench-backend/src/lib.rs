//! Compute backend abstraction for accelerator micro-benchmarks.
//!
//! The [`ComputeBackend`] trait covers adapter discovery and device
//! creation; [`ComputeDevice`] and [`CommandQueue`] cover queue creation,
//! device memory, asynchronous submission and timeline [`Fence`]s.
//!
//! [`reference::ReferenceBackend`] is a host-simulated accelerator with a
//! real device timeline per queue, used by the benchmark harness when no
//! native stack is present and by tests. [`probe`] reports whether the
//! native platform libraries are loadable.
//!
//! ```
//! use accelbench_backend::{AdapterAttribute, ComputeBackend, FeatureLevel, QueueKind};
//! use accelbench_backend::reference::ReferenceBackend;
//!
//! let backend = ReferenceBackend::default_topology();
//! let adapters = backend.enumerate_adapters(&[AdapterAttribute::CoreCompute]).unwrap();
//! let device = backend.create_device(&adapters[0], FeatureLevel::Core1_0).unwrap();
//! let queue = device.create_queue(QueueKind::Compute).unwrap();
//! let fence = device.create_fence(0).unwrap();
//! queue.signal(&fence, 1).unwrap();
//! assert!(fence.wait_for(1, None));
//! ```

mod backend;
mod error;
mod fence;
pub mod probe;
pub mod reference;
mod types;

pub use backend::{CommandQueue, ComputeBackend, ComputeDevice};
pub use error::{BackendError, Result};
pub use fence::Fence;
pub use types::{
    AdapterAttribute, AdapterDescriptor, DeviceBuffer, FeatureLevel, QueueKind, WorkItem,
};
