//! Accelerator inference micro-benchmark core.
//!
//! Pipeline, leaf first:
//!
//! 1. [`selector::AdapterSelector`] picks an adapter (compute-only preferred).
//! 2. [`provision::DeviceProvisioner`] creates device, compute queue and
//!    accelerator context, all or nothing.
//! 3. [`session::InferenceSessionAdapter`] builds the session and binds
//!    accelerator-resident tensors.
//! 4. [`runner::BenchmarkRunner`] times warmup and the steady-state loop,
//!    delimiting every iteration with [`fence::FenceSynchronizer`].
//!
//! [`run_benchmark`] wires these together against a [`RuntimeEnvironment`].

pub mod capability;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod fence;
pub mod provision;
pub mod reference_engine;
pub mod runner;
pub mod selector;
pub mod session;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use accelbench_backend::AdapterDescriptor;
use serde::Serialize;
use tracing::{debug, info, info_span};

pub use capability::CapabilityReport;
pub use config::{BenchConfig, ConfigError, DeviceTarget, LogFormat};
pub use environment::{EnvironmentOptions, RuntimeEnvironment};
pub use error::{BenchError, ProvisionError, SelectionError, SyncError};
pub use fence::{FenceSynchronizer, WaitTimeout};
pub use runner::{BenchmarkReport, BenchmarkRunner};

use crate::engine::TensorInfo;
use crate::provision::DeviceProvisioner;
use crate::selector::AdapterSelector;
use crate::session::InferenceSessionAdapter;

/// Everything a completed run reports.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkOutcome {
    pub adapter: String,
    pub compute_only: bool,
    pub model: String,
    pub model_load: Duration,
    /// Declared input and output counts; only the first of each is bound.
    pub input_count: usize,
    pub output_count: usize,
    pub input: TensorInfo,
    pub output: TensorInfo,
    pub report: BenchmarkReport,
}

impl BenchmarkOutcome {
    pub fn model_load_ms(&self) -> f64 {
        self.model_load.as_secs_f64() * 1000.0
    }
}

/// Select, provision, load, bind and time `model_path` per `config`.
///
/// Every resource created along the way is released before returning,
/// on success and on every error path.
pub fn run_benchmark(
    env: &RuntimeEnvironment,
    config: &BenchConfig,
    model_path: &Path,
) -> Result<BenchmarkOutcome, BenchError> {
    config.validate()?;
    if !config.session.per_session_threads && !env.options().global_thread_pool {
        return Err(ConfigError::Validation(
            "sessions without their own threads need the global thread pool".into(),
        )
        .into());
    }
    let _span = info_span!("run", model = %model_path.display(), device = %config.device).entered();

    let adapter: AdapterDescriptor = AdapterSelector::new(env.backend())
        .select_compute_adapter(config.device.prefer_compute_only())?;
    let accelerator = DeviceProvisioner::new(env.backend(), env.engine()).provision(adapter)?;

    let load_start = Instant::now();
    let model = env
        .engine()
        .open_model(model_path)
        .map_err(|source| BenchError::ModelLoad { path: model_path.to_path_buf(), source })?;
    let mut session = InferenceSessionAdapter::create_session(
        env.engine(),
        model.as_ref(),
        &config.session,
        accelerator.context(),
    )
    .map_err(|source| BenchError::ModelLoad { path: model_path.to_path_buf(), source })?;
    let model_load = load_start.elapsed();
    info!(model = model.name(), load_ms = model_load.as_secs_f64() * 1000.0, "model loaded");

    let (input, output) = {
        let bound = session.bind().map_err(BenchError::Binding)?;
        (bound.input.info().clone(), bound.output.info().clone())
    };

    let fence = accelerator
        .device()
        .create_fence(0)
        .map_err(|e| BenchError::Sync(SyncError::Signal(e)))?;
    let mut runner = BenchmarkRunner::new(
        Arc::clone(accelerator.queue()),
        FenceSynchronizer::new(fence),
        WaitTimeout::from_millis(config.wait_timeout_ms),
    );
    let report = runner.run(&mut session, config.iterations)?;

    let readback = session.read_output().map_err(BenchError::Binding)?;
    debug!(output = %output.name, bytes = readback.len(), "output read back from accelerator");

    Ok(BenchmarkOutcome {
        adapter: accelerator.adapter().name.clone(),
        compute_only: accelerator.adapter().is_compute_only(),
        model: model.name().to_string(),
        model_load,
        input_count: model.inputs().len(),
        output_count: model.outputs().len(),
        input,
        output,
        report,
    })
}
