//! Process-scoped runtime state.

use tracing::info;

use accelbench_backend::ComputeBackend;

use crate::engine::InferenceEngine;

/// Engine-wide options fixed at environment creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentOptions {
    /// Emit engine telemetry events. Off for benchmarking.
    pub telemetry: bool,
    /// Sessions share one global thread pool instead of owning their own.
    pub global_thread_pool: bool,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self { telemetry: false, global_thread_pool: true }
    }
}

/// The compute backend and inference engine for this process.
///
/// Created once in `main`, borrowed by everything that needs it, and dropped
/// at exit.
pub struct RuntimeEnvironment {
    backend: Box<dyn ComputeBackend>,
    engine: Box<dyn InferenceEngine>,
    options: EnvironmentOptions,
}

impl RuntimeEnvironment {
    pub fn new(
        backend: Box<dyn ComputeBackend>,
        mut engine: Box<dyn InferenceEngine>,
        options: EnvironmentOptions,
    ) -> Self {
        engine.set_telemetry(options.telemetry);
        info!(
            backend = backend.name(),
            engine = engine.name(),
            telemetry = options.telemetry,
            global_thread_pool = options.global_thread_pool,
            "runtime environment initialised"
        );
        Self { backend, engine, options }
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    pub fn engine(&self) -> &dyn InferenceEngine {
        self.engine.as_ref()
    }

    pub fn options(&self) -> EnvironmentOptions {
        self.options
    }
}

impl std::fmt::Debug for RuntimeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEnvironment")
            .field("backend", &self.backend.name())
            .field("engine", &self.engine.name())
            .field("options", &self.options)
            .finish()
    }
}
