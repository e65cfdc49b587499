//! Reference inference engine driven by JSON model manifests.
//!
//! A manifest declares the model's tensors and how much device time one
//! inference costs:
//!
//! ```json
//! {
//!   "name": "mobilenet",
//!   "inputs":  [{ "name": "input",  "element_type": "f32", "shape": [1, 3, 224, 224] }],
//!   "outputs": [{ "name": "output", "element_type": "f32", "shape": [1, 1000] }],
//!   "compute_micros": 1500,
//!   "compile_micros": 40000
//! }
//! ```
//!
//! `compile_micros` is paid once, on the first run of a session. Runs are
//! submitted to the context's queue as work items, so they execute on the
//! device timeline and [`Session::run`] returns as soon as they are queued.

use std::any::Any;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use accelbench_backend::{CommandQueue, ComputeDevice, FeatureLevel, QueueKind, WorkItem};
use serde::Deserialize;
use tracing::{debug, info};

use crate::engine::{
    AcceleratorContext, EngineError, ExecutionMode, InferenceEngine, MemoryLocation, Model,
    Session, SessionOptions, Tensor, TensorInfo,
};

/// Host execution provider name.
pub const CPU_PROVIDER: &str = "ReferenceCpuProvider";
/// Accelerator execution provider name.
pub const ACCELERATOR_PROVIDER: &str = "ReferenceAcceleratorProvider";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelManifest {
    name: String,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    #[serde(default)]
    compute_micros: u64,
    #[serde(default)]
    compile_micros: u64,
    #[serde(default)]
    min_feature_level: Option<String>,
}

/// A model opened by [`ReferenceEngine`].
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    name: String,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    compute: Duration,
    compile: Duration,
    min_feature_level: FeatureLevel,
}

impl ReferenceModel {
    fn from_manifest(path: &Path, manifest: ModelManifest) -> Result<Self, EngineError> {
        let malformed =
            |reason: String| EngineError::Malformed { path: path.to_path_buf(), reason };

        if manifest.inputs.is_empty() {
            return Err(malformed("model declares no inputs".into()));
        }
        if manifest.outputs.is_empty() {
            return Err(malformed("model declares no outputs".into()));
        }
        for info in manifest.inputs.iter().chain(&manifest.outputs) {
            if !info.is_static() {
                return Err(EngineError::DynamicShape {
                    tensor: info.name.clone(),
                    shape: info.shape.clone(),
                });
            }
            if info.byte_len().is_none() {
                return Err(malformed(format!("tensor `{}` is too large", info.name)));
            }
        }
        let min_feature_level = match manifest.min_feature_level {
            Some(level) => level.parse::<FeatureLevel>().map_err(malformed)?,
            None => FeatureLevel::Core1_0,
        };

        Ok(Self {
            name: manifest.name,
            inputs: manifest.inputs,
            outputs: manifest.outputs,
            compute: Duration::from_micros(manifest.compute_micros),
            compile: Duration::from_micros(manifest.compile_micros),
            min_feature_level,
        })
    }
}

impl Model for ReferenceModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Engine with a host provider and an accelerator provider.
///
/// Clones share one telemetry event counter.
#[derive(Debug, Clone)]
pub struct ReferenceEngine {
    accelerator_available: bool,
    telemetry: bool,
    telemetry_events: Arc<AtomicU64>,
}

impl ReferenceEngine {
    pub fn new() -> Self {
        Self {
            accelerator_available: true,
            telemetry: false,
            telemetry_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Engine whose accelerator provider failed to load.
    pub fn without_accelerator() -> Self {
        Self { accelerator_available: false, ..Self::new() }
    }

    /// Telemetry events emitted by sessions of this engine.
    pub fn telemetry_events(&self) -> u64 {
        self.telemetry_events.load(Ordering::Relaxed)
    }
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for ReferenceEngine {
    fn name(&self) -> &str {
        "reference"
    }

    fn available_providers(&self) -> Vec<String> {
        let mut providers = Vec::with_capacity(2);
        if self.accelerator_available {
            providers.push(ACCELERATOR_PROVIDER.to_string());
        }
        providers.push(CPU_PROVIDER.to_string());
        providers
    }

    fn accelerator_provider(&self) -> &str {
        ACCELERATOR_PROVIDER
    }

    fn set_telemetry(&mut self, enabled: bool) {
        self.telemetry = enabled;
    }

    fn open_model(&self, path: &Path) -> Result<Box<dyn Model>, EngineError> {
        if !path.exists() {
            return Err(EngineError::ModelNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|source| EngineError::Io { path: path.to_path_buf(), source })?;
        let manifest: ModelManifest = serde_json::from_str(&text).map_err(|e| {
            EngineError::Malformed { path: path.to_path_buf(), reason: e.to_string() }
        })?;
        let model = ReferenceModel::from_manifest(path, manifest)?;
        info!(
            model = %model.name,
            inputs = model.inputs.len(),
            outputs = model.outputs.len(),
            "opened model"
        );
        Ok(Box::new(model))
    }

    fn create_accelerator_context(
        &self,
        device: Arc<dyn ComputeDevice>,
        queue: Arc<dyn CommandQueue>,
    ) -> Result<AcceleratorContext, EngineError> {
        if !self.accelerator_available {
            return Err(EngineError::Unavailable {
                provider: ACCELERATOR_PROVIDER.to_string(),
                reason: "accelerator runtime library not found".to_string(),
            });
        }
        if queue.kind() == QueueKind::Copy {
            return Err(EngineError::Incompatible(format!(
                "{ACCELERATOR_PROVIDER} cannot dispatch on a copy queue"
            )));
        }
        debug!(device = device.id(), queue = queue.id(), "created accelerator context");
        Ok(AcceleratorContext::new(ACCELERATOR_PROVIDER, device, queue))
    }

    fn create_session(
        &self,
        model: &dyn Model,
        options: &SessionOptions,
        context: &AcceleratorContext,
    ) -> Result<Box<dyn Session>, EngineError> {
        let model = model.as_any().downcast_ref::<ReferenceModel>().ok_or_else(|| {
            EngineError::Incompatible(format!(
                "model `{}` was not opened by this engine",
                model.name()
            ))
        })?;
        if context.provider() != ACCELERATOR_PROVIDER {
            return Err(EngineError::Incompatible(format!(
                "context provider `{}` is not {ACCELERATOR_PROVIDER}",
                context.provider()
            )));
        }
        if options.memory_pattern {
            return Err(EngineError::Incompatible(
                "memory pattern planning must be disabled for accelerator sessions".into(),
            ));
        }
        if options.execution_mode == ExecutionMode::Parallel {
            return Err(EngineError::Incompatible(
                "accelerator sessions require sequential execution".into(),
            ));
        }
        let level = context.device().feature_level();
        if level < model.min_feature_level {
            return Err(EngineError::Incompatible(format!(
                "model `{}` needs feature level {}, device provides {level}",
                model.name, model.min_feature_level
            )));
        }

        debug!(model = %model.name, device = context.device().id(), "created session");
        Ok(Box::new(ReferenceSession {
            model: model.clone(),
            context: context.clone(),
            runs: 0,
            telemetry: self.telemetry.then(|| Arc::clone(&self.telemetry_events)),
        }))
    }
}

/// Session produced by [`ReferenceEngine`].
#[derive(Debug)]
pub struct ReferenceSession {
    model: ReferenceModel,
    context: AcceleratorContext,
    runs: u64,
    /// Event counter, present only when telemetry is on.
    telemetry: Option<Arc<AtomicU64>>,
}

impl ReferenceSession {
    fn check_binding(&self, expected: &TensorInfo, tensor: &Tensor) -> Result<(), EngineError> {
        let actual = tensor.info();
        if actual.shape != expected.shape || actual.element_type != expected.element_type {
            return Err(EngineError::ShapeMismatch {
                tensor: expected.name.clone(),
                expected: expected.shape.clone(),
                element_type: expected.element_type,
                actual: actual.shape.clone(),
                actual_type: actual.element_type,
            });
        }
        match tensor.device_buffer() {
            Some(buffer) if buffer.device_id() == self.context.device().id() => Ok(()),
            _ => Err(EngineError::NotAcceleratorResident { tensor: expected.name.clone() }),
        }
    }
}

impl Session for ReferenceSession {
    fn inputs(&self) -> &[TensorInfo] {
        &self.model.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.model.outputs
    }

    fn context(&self) -> &AcceleratorContext {
        &self.context
    }

    fn allocate_tensor(
        &self,
        info: &TensorInfo,
        location: MemoryLocation,
    ) -> Result<Tensor, EngineError> {
        let len = info.byte_len().ok_or_else(|| EngineError::DynamicShape {
            tensor: info.name.clone(),
            shape: info.shape.clone(),
        })?;
        match location {
            MemoryLocation::Host => Ok(Tensor::host(info.clone(), len)),
            MemoryLocation::Accelerator => {
                let buffer = self.context.device().allocate_buffer(len)?;
                Ok(Tensor::accelerator(info.clone(), buffer))
            }
        }
    }

    fn run(&mut self, inputs: &[&Tensor], outputs: &[&Tensor]) -> Result<(), EngineError> {
        // Only the first input and output are bound.
        let input = inputs.first().ok_or(EngineError::MissingBinding { kind: "input" })?;
        let output = outputs.first().ok_or(EngineError::MissingBinding { kind: "output" })?;
        self.check_binding(&self.model.inputs[0], input)?;
        self.check_binding(&self.model.outputs[0], output)?;

        let cost = if self.runs == 0 {
            self.model.compile + self.model.compute
        } else {
            self.model.compute
        };
        let sequence = self.runs + 1;
        let target = output.device_buffer().cloned();
        let source = input.device_buffer().cloned();

        let work = WorkItem::new(format!("{}#{sequence}", self.model.name), move || {
            if !cost.is_zero() {
                thread::sleep(cost);
            }
            let seed = source.map_or(0, |b| {
                b.read_to_vec().iter().fold(0u8, |a, x| a.wrapping_add(*x))
            });
            if let Some(out) = target {
                out.write_with(|bytes| bytes.fill(seed.wrapping_add(sequence as u8)));
            }
        });
        self.context.queue().submit(work)?;
        self.runs = sequence;

        if let Some(events) = &self.telemetry {
            events.fetch_add(1, Ordering::Relaxed);
            info!(
                target: "accelbench::telemetry",
                model = %self.model.name,
                sequence,
                cost_us = cost.as_micros() as u64,
                "inference submitted"
            );
        }
        Ok(())
    }
}
