//! The inference engine capability.
//!
//! The harness never looks inside a model: it opens one, asks for its
//! declared inputs/outputs, builds a session bound to an
//! [`AcceleratorContext`], allocates tensors and calls [`Session::run`].
//! Everything else (graph optimisation, kernels, in-model memory) belongs to
//! the engine.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use accelbench_backend::{BackendError, CommandQueue, ComputeDevice, DeviceBuffer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine or one of its execution providers could not be loaded.
    #[error("execution provider `{provider}` is unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    /// Model, options or context cannot be combined.
    #[error("incompatible: {0}")]
    Incompatible(String),

    #[error("tensor `{tensor}` has dynamic shape {shape:?}; only static shapes are supported")]
    DynamicShape { tensor: String, shape: Vec<i64> },

    #[error("expected at least one {kind} tensor binding")]
    MissingBinding { kind: &'static str },

    #[error("tensor `{tensor}` expects {expected:?} {element_type}, got {actual:?} {actual_type}")]
    ShapeMismatch {
        tensor: String,
        expected: Vec<i64>,
        element_type: ElementType,
        actual: Vec<i64>,
        actual_type: ElementType,
    },

    #[error("tensor `{tensor}` is not resident on the session's accelerator")]
    NotAcceleratorResident { tensor: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl EngineError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
            || matches!(self, Self::Backend(e) if e.is_unavailable())
    }
}

// ── Tensor metadata ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    F32,
    F16,
    I64,
    I32,
    I8,
    U8,
}

impl ElementType {
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F16 => 2,
            Self::I64 => 8,
            Self::I8 | Self::U8 => 1,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::I64 => "i64",
            Self::I32 => "i32",
            Self::I8 => "i8",
            Self::U8 => "u8",
        };
        f.write_str(s)
    }
}

/// Declared name, element type and shape of a model input or output.
///
/// Negative dimensions mark dynamic axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: String,
    pub element_type: ElementType,
    pub shape: Vec<i64>,
}

impl TensorInfo {
    pub fn new(name: impl Into<String>, element_type: ElementType, shape: Vec<i64>) -> Self {
        Self { name: name.into(), element_type, shape }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_static(&self) -> bool {
        self.shape.iter().all(|d| *d >= 0)
    }

    /// Number of elements, or `None` for dynamic shapes or on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, d| usize::try_from(*d).ok().and_then(|d| acc.checked_mul(d)))
    }

    pub fn byte_len(&self) -> Option<usize> {
        self.element_count()?.checked_mul(self.element_type.size_bytes())
    }

    /// Shape rendered as space-separated dimensions.
    pub fn dims(&self) -> String {
        self.shape.iter().map(i64::to_string).collect::<Vec<_>>().join(" ")
    }
}

// ── Tensors ─────────────────────────────────────────────────────────────────

/// Where a tensor's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    Host,
    Accelerator,
}

#[derive(Debug, Clone)]
enum TensorStorage {
    Host(Vec<u8>),
    Accelerator(DeviceBuffer),
}

/// A named, shaped, typed buffer with a fixed shape.
#[derive(Debug, Clone)]
pub struct Tensor {
    info: TensorInfo,
    storage: TensorStorage,
}

impl Tensor {
    /// Zeroed host tensor.
    pub fn host(info: TensorInfo, len: usize) -> Self {
        Self { info, storage: TensorStorage::Host(vec![0; len]) }
    }

    /// Tensor backed by accelerator-resident memory.
    pub fn accelerator(info: TensorInfo, buffer: DeviceBuffer) -> Self {
        Self { info, storage: TensorStorage::Accelerator(buffer) }
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn location(&self) -> MemoryLocation {
        match self.storage {
            TensorStorage::Host(_) => MemoryLocation::Host,
            TensorStorage::Accelerator(_) => MemoryLocation::Accelerator,
        }
    }

    pub fn byte_len(&self) -> usize {
        match &self.storage {
            TensorStorage::Host(bytes) => bytes.len(),
            TensorStorage::Accelerator(buffer) => buffer.len(),
        }
    }

    /// The backing device buffer, if accelerator-resident.
    pub fn device_buffer(&self) -> Option<&DeviceBuffer> {
        match &self.storage {
            TensorStorage::Accelerator(buffer) => Some(buffer),
            TensorStorage::Host(_) => None,
        }
    }

    /// Copy the contents to host memory.
    pub fn read_to_vec(&self) -> Vec<u8> {
        match &self.storage {
            TensorStorage::Host(bytes) => bytes.clone(),
            TensorStorage::Accelerator(buffer) => buffer.read_to_vec(),
        }
    }
}

// ── Session options and accelerator context ─────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

/// Session construction options.
///
/// Defaults match what accelerator providers require: no memory-pattern
/// planning, no per-session thread pools, sequential execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub memory_pattern: bool,
    pub per_session_threads: bool,
    pub execution_mode: ExecutionMode,
}

/// Handle the engine needs to place work on a provisioned accelerator.
#[derive(Debug, Clone)]
pub struct AcceleratorContext {
    provider: String,
    device: Arc<dyn ComputeDevice>,
    queue: Arc<dyn CommandQueue>,
}

impl AcceleratorContext {
    pub fn new(
        provider: impl Into<String>,
        device: Arc<dyn ComputeDevice>,
        queue: Arc<dyn CommandQueue>,
    ) -> Self {
        Self { provider: provider.into(), device, queue }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<dyn CommandQueue> {
        &self.queue
    }
}

// ── Capability traits ───────────────────────────────────────────────────────

/// A loaded model, before it is bound to a device.
pub trait Model: Send + fmt::Debug {
    fn name(&self) -> &str;
    fn inputs(&self) -> &[TensorInfo];
    fn outputs(&self) -> &[TensorInfo];
    /// Lets an engine recover its own concrete model type.
    fn as_any(&self) -> &dyn Any;
}

/// A model bound to one device and queue; cannot be rebound.
pub trait Session: Send + fmt::Debug {
    fn inputs(&self) -> &[TensorInfo];
    fn outputs(&self) -> &[TensorInfo];
    fn context(&self) -> &AcceleratorContext;

    /// Allocate a tensor shaped after `info`.
    fn allocate_tensor(
        &self,
        info: &TensorInfo,
        location: MemoryLocation,
    ) -> Result<Tensor, EngineError>;

    /// Submit one inference. Returns once the work is queued on the
    /// accelerator, not when it has finished.
    fn run(&mut self, inputs: &[&Tensor], outputs: &[&Tensor]) -> Result<(), EngineError>;
}

/// Inference runtime with at least one accelerator execution provider.
pub trait InferenceEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Every execution provider compiled into the engine.
    fn available_providers(&self) -> Vec<String>;

    /// Provider used for accelerator sessions.
    fn accelerator_provider(&self) -> &str;

    /// Turn engine telemetry on or off for sessions created afterwards.
    fn set_telemetry(&mut self, enabled: bool);

    fn open_model(&self, path: &Path) -> Result<Box<dyn Model>, EngineError>;

    fn create_accelerator_context(
        &self,
        device: Arc<dyn ComputeDevice>,
        queue: Arc<dyn CommandQueue>,
    ) -> Result<AcceleratorContext, EngineError>;

    fn create_session(
        &self,
        model: &dyn Model,
        options: &SessionOptions,
        context: &AcceleratorContext,
    ) -> Result<Box<dyn Session>, EngineError>;
}
