//! Plain data types shared by every compute backend.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

// ── Handle generation ───────────────────────────────────────────────────────

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique opaque handle value.
pub(crate) fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

// ── Adapter ─────────────────────────────────────────────────────────────────

/// Capability attributes an adapter can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterAttribute {
    /// Supports the core compute subset (no graphics pipeline required).
    CoreCompute,
    /// Supports graphics rendering in addition to compute.
    Graphics,
}

impl fmt::Display for AdapterAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoreCompute => write!(f, "core-compute"),
            Self::Graphics => write!(f, "graphics"),
        }
    }
}

/// Opaque handle to a physical or logical compute unit, as enumerated.
///
/// Immutable once enumerated. The selector keeps the one it picks and the
/// rest are dropped with the enumeration result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterDescriptor {
    /// Backend-assigned identifier (a LUID on real hardware).
    pub id: u64,
    /// Human-readable adapter name.
    pub name: String,
    /// PCI vendor ID (0 when unknown).
    pub vendor_id: u32,
    /// Whether the adapter can run graphics workloads.
    pub supports_graphics: bool,
    /// Whether the adapter can run core compute workloads.
    pub supports_core_compute: bool,
    /// Dedicated accelerator memory in bytes.
    pub dedicated_memory_bytes: u64,
}

impl AdapterDescriptor {
    /// Whether this adapter advertises `attribute`.
    pub const fn supports(&self, attribute: AdapterAttribute) -> bool {
        match attribute {
            AdapterAttribute::CoreCompute => self.supports_core_compute,
            AdapterAttribute::Graphics => self.supports_graphics,
        }
    }

    /// Whether this adapter advertises every attribute in `filter`.
    pub fn satisfies(&self, filter: &[AdapterAttribute]) -> bool {
        filter.iter().all(|attr| self.supports(*attr))
    }

    /// Compute-capable but graphics-incapable (NPU-class).
    pub const fn is_compute_only(&self) -> bool {
        self.supports_core_compute && !self.supports_graphics
    }
}

impl fmt::Display for AdapterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = if self.is_compute_only() { "compute-only" } else { "graphics" };
        write!(f, "{} ({class}, id {:#x})", self.name, self.id)
    }
}

// ── Feature level ───────────────────────────────────────────────────────────

/// Device feature levels, ordered from least to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    /// Compute-only core profile; the minimum for NPU-class devices.
    Core1_0,
    /// Full graphics + compute, level 11.
    Level11_0,
    /// Full graphics + compute, level 12.
    Level12_0,
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core1_0 => write!(f, "core_1_0"),
            Self::Level11_0 => write!(f, "11_0"),
            Self::Level12_0 => write!(f, "12_0"),
        }
    }
}

impl std::str::FromStr for FeatureLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core_1_0" | "core1_0" | "core" => Ok(Self::Core1_0),
            "11_0" | "11" => Ok(Self::Level11_0),
            "12_0" | "12" => Ok(Self::Level12_0),
            other => Err(format!("unknown feature level: {other}")),
        }
    }
}

// ── Queue ───────────────────────────────────────────────────────────────────

/// Which engine a command queue feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Compute workloads only.
    Compute,
    /// Graphics + compute + copy.
    Direct,
    /// Copy engine.
    Copy,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compute => write!(f, "compute"),
            Self::Direct => write!(f, "direct"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

/// One unit of device work submitted to a [`CommandQueue`](crate::CommandQueue).
///
/// The task runs on the device timeline, never on the submitting thread.
pub struct WorkItem {
    label: String,
    task: Box<dyn FnOnce() + Send + 'static>,
}

impl WorkItem {
    pub fn new(label: impl Into<String>, task: impl FnOnce() + Send + 'static) -> Self {
        Self { label: label.into(), task: Box::new(task) }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Execute the work. Called by the device timeline.
    pub fn execute(self) {
        (self.task)();
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem").field("label", &self.label).finish_non_exhaustive()
    }
}

// ── Memory ──────────────────────────────────────────────────────────────────

/// An accelerator-resident buffer.
///
/// Clones share the same storage; the device releases the allocation when
/// the last clone is dropped.
#[derive(Debug, Clone)]
pub struct DeviceBuffer {
    id: u64,
    device_id: u64,
    data: Arc<Mutex<Vec<u8>>>,
    len: usize,
}

impl DeviceBuffer {
    /// Wrap zero-initialised storage of `len` bytes owned by `device_id`.
    pub fn zeroed(device_id: u64, len: usize) -> Self {
        Self { id: next_handle(), device_id, data: Arc::new(Mutex::new(vec![0; len])), len }
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Handle of the device this buffer lives on.
    pub const fn device_id(&self) -> u64 {
        self.device_id
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mutate the buffer contents in place.
    pub fn write_with<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Copy the buffer contents back to host memory.
    pub fn read_to_vec(&self) -> Vec<u8> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of live handles sharing this allocation.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }

    /// Weak reference to the storage, used by devices for residency tracking.
    pub(crate) fn downgrade(&self) -> Weak<Mutex<Vec<u8>>> {
        Arc::downgrade(&self.data)
    }
}
