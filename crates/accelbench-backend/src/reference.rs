//! In-process reference accelerator.
//!
//! Implements the [`ComputeBackend`] surface entirely on the host: adapters
//! come from a configurable topology, and every command queue owns a
//! device-timeline thread that executes work items in submission order and
//! completes fences only after the work ahead of them has drained. Submitting
//! and signalling never block the caller, so host/device ordering behaves the
//! way it does on real hardware.
//!
//! The topology can be overridden with `ACCELBENCH_FAKE_ADAPTERS`, e.g.
//! `ACCELBENCH_FAKE_ADAPTERS="gpu0=graphics+compute,npu0=compute"`.
//! `none` yields an empty adapter list and `unavailable` simulates a missing
//! discovery library. Every failable call can be made to fail via
//! [`FailPoint`] for tests.
//!
//! Dropping a queue closes it and waits up to the backend's drain timeout for
//! outstanding work. A timeline still busy after that is detached, so a hung
//! device never blocks teardown.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::backend::{CommandQueue, ComputeBackend, ComputeDevice};
use crate::error::{BackendError, Result};
use crate::fence::Fence;
use crate::types::{
    next_handle, AdapterAttribute, AdapterDescriptor, DeviceBuffer, FeatureLevel, QueueKind,
    WorkItem,
};

/// Environment variable overriding the reference adapter topology.
pub const FAKE_ADAPTERS_ENV: &str = "ACCELBENCH_FAKE_ADAPTERS";

/// How long dropping a queue waits for outstanding work by default.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Library names reported when a fail point simulates a missing runtime.
const DISCOVERY_LIBRARY: &str = "reference device discovery";
const DEVICE_LIBRARY: &str = "reference device runtime";

/// Calls that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Discovery library cannot be loaded.
    EnumerationUnavailable,
    /// Discovery library loaded, enumeration call fails.
    Enumerate,
    /// Device-creation library cannot be loaded.
    DeviceRuntimeUnavailable,
    CreateDevice,
    CreateQueue,
    CreateFence,
    Allocate,
    Submit,
    Signal,
}

#[derive(Debug, Default)]
struct Counters {
    live_devices: AtomicUsize,
    live_queues: AtomicUsize,
    submissions: AtomicU64,
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Builder for [`ReferenceBackend`].
#[derive(Debug)]
pub struct ReferenceBackendBuilder {
    adapters: Vec<AdapterDescriptor>,
    fail_points: HashSet<FailPoint>,
    drain_timeout: Duration,
}

impl Default for ReferenceBackendBuilder {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            fail_points: HashSet::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl ReferenceBackendBuilder {
    /// Start with an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an adapter with explicit capability flags.
    #[must_use]
    pub fn adapter(
        mut self,
        name: &str,
        supports_graphics: bool,
        supports_core_compute: bool,
    ) -> Self {
        let dedicated_memory_bytes =
            if supports_graphics { 4 * 1024 * 1024 * 1024 } else { 512 * 1024 * 1024 };
        self.adapters.push(AdapterDescriptor {
            id: next_handle(),
            name: name.to_string(),
            vendor_id: 0,
            supports_graphics,
            supports_core_compute,
            dedicated_memory_bytes,
        });
        self
    }

    /// Append a fully specified adapter.
    #[must_use]
    pub fn descriptor(mut self, descriptor: AdapterDescriptor) -> Self {
        self.adapters.push(descriptor);
        self
    }

    /// Make `point` fail whenever it is reached.
    #[must_use]
    pub fn fail_at(mut self, point: FailPoint) -> Self {
        self.fail_points.insert(point);
        self
    }

    /// Bound on how long dropping a queue waits for its outstanding work.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn build(self) -> ReferenceBackend {
        ReferenceBackend {
            adapters: self.adapters,
            fail_points: Arc::new(self.fail_points),
            counters: Arc::new(Counters::default()),
            drain_timeout: self.drain_timeout,
        }
    }
}

// ── Backend ─────────────────────────────────────────────────────────────────

/// Host-simulated accelerator backend.
///
/// Clones share fail points and live-object counters.
#[derive(Debug, Clone)]
pub struct ReferenceBackend {
    adapters: Vec<AdapterDescriptor>,
    fail_points: Arc<HashSet<FailPoint>>,
    counters: Arc<Counters>,
    drain_timeout: Duration,
}

impl ReferenceBackend {
    pub fn builder() -> ReferenceBackendBuilder {
        ReferenceBackendBuilder::new()
    }

    /// Default topology: a graphics-capable GPU enumerated ahead of a
    /// compute-only NPU.
    pub fn default_topology() -> Self {
        Self::builder()
            .adapter("Reference GPU", true, true)
            .adapter("Reference NPU", false, true)
            .build()
    }

    /// Topology from a spec string (see the module docs for the format).
    pub fn from_spec(spec: &str) -> std::result::Result<Self, String> {
        parse_topology(spec).map(ReferenceBackendBuilder::build)
    }

    /// Topology from `ACCELBENCH_FAKE_ADAPTERS`, falling back to
    /// [`ReferenceBackend::default_topology`] when unset.
    pub fn from_env() -> std::result::Result<Self, String> {
        match std::env::var(FAKE_ADAPTERS_ENV) {
            Ok(spec) => Self::from_spec(&spec),
            Err(_) => Ok(Self::default_topology()),
        }
    }

    /// Devices created by this backend that have not been dropped.
    pub fn live_devices(&self) -> usize {
        self.counters.live_devices.load(Ordering::SeqCst)
    }

    /// Queues created by this backend that have not been dropped.
    pub fn live_queues(&self) -> usize {
        self.counters.live_queues.load(Ordering::SeqCst)
    }

    /// Work items accepted across all queues.
    pub fn submissions(&self) -> u64 {
        self.counters.submissions.load(Ordering::SeqCst)
    }

    fn fails(&self, point: FailPoint) -> bool {
        self.fail_points.contains(&point)
    }
}

impl Default for ReferenceBackend {
    fn default() -> Self {
        Self::default_topology()
    }
}

impl ComputeBackend for ReferenceBackend {
    fn name(&self) -> &str {
        "reference"
    }

    fn enumerate_adapters(&self, filter: &[AdapterAttribute]) -> Result<Vec<AdapterDescriptor>> {
        if self.fails(FailPoint::EnumerationUnavailable) {
            return Err(BackendError::unavailable(DISCOVERY_LIBRARY, "library not found"));
        }
        if self.fails(FailPoint::Enumerate) {
            return Err(BackendError::call_failed("CreateAdapterList", "injected failure"));
        }
        let adapters: Vec<_> =
            self.adapters.iter().filter(|a| a.satisfies(filter)).cloned().collect();
        debug!(total = self.adapters.len(), matched = adapters.len(), "enumerated adapters");
        Ok(adapters)
    }

    fn create_device(
        &self,
        adapter: &AdapterDescriptor,
        min_level: FeatureLevel,
    ) -> Result<Arc<dyn ComputeDevice>> {
        if self.fails(FailPoint::DeviceRuntimeUnavailable) {
            return Err(BackendError::unavailable(DEVICE_LIBRARY, "library not found"));
        }
        if !self.adapters.iter().any(|a| a.id == adapter.id) {
            return Err(BackendError::UnknownAdapter(adapter.id));
        }
        if self.fails(FailPoint::CreateDevice) {
            return Err(BackendError::call_failed("CreateDevice", "injected failure"));
        }
        let supported = max_feature_level(adapter);
        if min_level > supported {
            return Err(BackendError::FeatureLevelUnsupported { requested: min_level, supported });
        }

        let device = ReferenceDevice {
            id: next_handle(),
            adapter: adapter.clone(),
            feature_level: min_level,
            fail_points: Arc::clone(&self.fail_points),
            counters: Arc::clone(&self.counters),
            drain_timeout: self.drain_timeout,
            allocations: Mutex::new(Vec::new()),
        };
        self.counters.live_devices.fetch_add(1, Ordering::SeqCst);
        debug!(device = device.id, adapter = %adapter.name, level = %min_level, "created device");
        Ok(Arc::new(device))
    }
}

fn max_feature_level(adapter: &AdapterDescriptor) -> FeatureLevel {
    if adapter.supports_graphics {
        FeatureLevel::Level12_0
    } else {
        FeatureLevel::Core1_0
    }
}

// ── Device ──────────────────────────────────────────────────────────────────

/// Logical device on the reference accelerator.
#[derive(Debug)]
pub struct ReferenceDevice {
    id: u64,
    adapter: AdapterDescriptor,
    feature_level: FeatureLevel,
    fail_points: Arc<HashSet<FailPoint>>,
    counters: Arc<Counters>,
    drain_timeout: Duration,
    allocations: Mutex<Vec<(Weak<Mutex<Vec<u8>>>, usize)>>,
}

impl ReferenceDevice {
    /// Bytes held by allocations that are still alive.
    pub fn resident_bytes(&self) -> usize {
        let mut allocations = self.allocations.lock().unwrap_or_else(PoisonError::into_inner);
        allocations.retain(|(storage, _)| storage.strong_count() > 0);
        allocations.iter().map(|(_, len)| len).sum()
    }
}

impl ComputeDevice for ReferenceDevice {
    fn id(&self) -> u64 {
        self.id
    }

    fn adapter(&self) -> &AdapterDescriptor {
        &self.adapter
    }

    fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    fn create_queue(&self, kind: QueueKind) -> Result<Arc<dyn CommandQueue>> {
        if self.fail_points.contains(&FailPoint::CreateQueue) {
            return Err(BackendError::call_failed("CreateCommandQueue", "injected failure"));
        }
        // Compute-only adapters have no graphics engine to feed.
        if kind == QueueKind::Direct && !self.adapter.supports_graphics {
            return Err(BackendError::UnsupportedQueueKind(kind));
        }
        let queue = ReferenceQueue::spawn(
            kind,
            Arc::clone(&self.fail_points),
            Arc::clone(&self.counters),
            self.drain_timeout,
        )?;
        Ok(Arc::new(queue))
    }

    fn create_fence(&self, initial: u64) -> Result<Fence> {
        if self.fail_points.contains(&FailPoint::CreateFence) {
            return Err(BackendError::call_failed("CreateFence", "injected failure"));
        }
        Ok(Fence::new(initial))
    }

    fn allocate_buffer(&self, len: usize) -> Result<DeviceBuffer> {
        if self.fail_points.contains(&FailPoint::Allocate) {
            return Err(BackendError::call_failed("CreateCommittedResource", "injected failure"));
        }
        let capacity = usize::try_from(self.adapter.dedicated_memory_bytes).unwrap_or(usize::MAX);
        let available = capacity.saturating_sub(self.resident_bytes());
        if len > available {
            return Err(BackendError::OutOfDeviceMemory { requested: len, available });
        }
        let buffer = DeviceBuffer::zeroed(self.id, len);
        self.allocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((buffer.downgrade(), len));
        trace!(device = self.id, buffer = buffer.id(), len, "allocated device buffer");
        Ok(buffer)
    }
}

impl Drop for ReferenceDevice {
    fn drop(&mut self) {
        self.counters.live_devices.fetch_sub(1, Ordering::SeqCst);
        debug!(device = self.id, "released device");
    }
}

// ── Queue ───────────────────────────────────────────────────────────────────

enum Command {
    Execute(WorkItem),
    Signal { fence: Fence, value: u64 },
}

/// In-order command queue backed by a device-timeline thread.
#[derive(Debug)]
pub struct ReferenceQueue {
    id: u64,
    kind: QueueKind,
    sender: Option<Sender<Command>>,
    timeline: Option<JoinHandle<()>>,
    /// Receives once the timeline has executed everything and exited.
    drained: Mutex<Receiver<()>>,
    drain_timeout: Duration,
    last_signaled: Mutex<HashMap<u64, u64>>,
    fail_points: Arc<HashSet<FailPoint>>,
    counters: Arc<Counters>,
}

impl ReferenceQueue {
    fn spawn(
        kind: QueueKind,
        fail_points: Arc<HashSet<FailPoint>>,
        counters: Arc<Counters>,
        drain_timeout: Duration,
    ) -> Result<Self> {
        let id = next_handle();
        let (sender, receiver) = mpsc::channel();
        let (drained_tx, drained) = mpsc::channel();
        let timeline = thread::Builder::new()
            .name(format!("accelbench-queue-{id}"))
            .spawn(move || {
                device_timeline(id, receiver);
                let _ = drained_tx.send(());
            })
            .map_err(|e| BackendError::call_failed("CreateCommandQueue", e.to_string()))?;
        counters.live_queues.fetch_add(1, Ordering::SeqCst);
        debug!(queue = id, %kind, "created command queue");
        Ok(Self {
            id,
            kind,
            sender: Some(sender),
            timeline: Some(timeline),
            drained: Mutex::new(drained),
            drain_timeout,
            last_signaled: Mutex::new(HashMap::new()),
            fail_points,
            counters,
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or(BackendError::QueueClosed)?
            .send(command)
            .map_err(|_| BackendError::QueueClosed)
    }
}

fn device_timeline(queue_id: u64, commands: Receiver<Command>) {
    for command in commands {
        match command {
            Command::Execute(work) => {
                trace!(queue = queue_id, label = work.label(), "executing work item");
                work.execute();
            }
            Command::Signal { fence, value } => {
                trace!(queue = queue_id, fence = fence.id(), value, "fence completed");
                fence.complete(value);
            }
        }
    }
}

impl CommandQueue for ReferenceQueue {
    fn id(&self) -> u64 {
        self.id
    }

    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn submit(&self, work: WorkItem) -> Result<()> {
        if self.fail_points.contains(&FailPoint::Submit) {
            return Err(BackendError::call_failed("ExecuteCommandLists", "injected failure"));
        }
        self.send(Command::Execute(work))?;
        self.counters.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn signal(&self, fence: &Fence, value: u64) -> Result<()> {
        if self.fail_points.contains(&FailPoint::Signal) {
            return Err(BackendError::call_failed("Signal", "injected failure"));
        }
        {
            let mut last = self.last_signaled.lock().unwrap_or_else(PoisonError::into_inner);
            let previous =
                last.get(&fence.id()).copied().unwrap_or_else(|| fence.completed_value());
            if value <= previous {
                return Err(BackendError::FenceRegression { previous, requested: value });
            }
            last.insert(fence.id(), value);
        }
        self.send(Command::Signal { fence: fence.clone(), value })
    }
}

impl Drop for ReferenceQueue {
    fn drop(&mut self) {
        // Closing the channel lets the timeline drain outstanding work and exit.
        drop(self.sender.take());
        if let Some(timeline) = self.timeline.take() {
            let drained = self.drained.get_mut().unwrap_or_else(PoisonError::into_inner);
            match drained.recv_timeout(self.drain_timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        queue = self.id,
                        timeout_ms = self.drain_timeout.as_millis() as u64,
                        "device timeline still busy, detaching it"
                    );
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if timeline.join().is_err() {
                        warn!(queue = self.id, "device timeline panicked");
                    }
                }
            }
        }
        self.counters.live_queues.fetch_sub(1, Ordering::SeqCst);
        debug!(queue = self.id, "released command queue");
    }
}

// ── Topology spec ───────────────────────────────────────────────────────────

fn parse_topology(spec: &str) -> std::result::Result<ReferenceBackendBuilder, String> {
    let normalized = spec.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "none" | "" => return Ok(ReferenceBackendBuilder::new()),
        "unavailable" => {
            return Ok(ReferenceBackendBuilder::new().fail_at(FailPoint::EnumerationUnavailable))
        }
        _ => {}
    }

    let mut builder = ReferenceBackendBuilder::new();
    for entry in spec.split([',', ';']).map(str::trim).filter(|e| !e.is_empty()) {
        let (name, attrs) = entry
            .split_once('=')
            .ok_or_else(|| format!("adapter entry `{entry}` must look like name=attr+attr"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("adapter entry `{entry}` has an empty name"));
        }
        let mut graphics = false;
        let mut compute = false;
        for attr in attrs.split('+').map(str::trim).filter(|a| !a.is_empty()) {
            match attr.to_ascii_lowercase().as_str() {
                "graphics" => graphics = true,
                "compute" => compute = true,
                other => return Err(format!("unknown adapter attribute `{other}` in `{entry}`")),
            }
        }
        builder = builder.adapter(name, graphics, compute);
    }
    Ok(builder)
}
