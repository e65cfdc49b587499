//! What this host can run: engine providers, adapters and native runtimes.

use accelbench_backend::probe::{native_stack_available, probe_native_runtimes, RuntimeProbe};
use accelbench_backend::AdapterAttribute;
use serde::Serialize;
use tracing::debug;

use crate::environment::RuntimeEnvironment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterSummary {
    pub name: String,
    pub supports_graphics: bool,
    pub supports_core_compute: bool,
    pub compute_only: bool,
    pub dedicated_memory_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeLibrary {
    pub component: String,
    pub library: String,
    pub available: bool,
}

impl From<&RuntimeProbe> for NativeLibrary {
    fn from(p: &RuntimeProbe) -> Self {
        Self {
            component: p.runtime.to_string(),
            library: p.library.to_string(),
            available: p.available,
        }
    }
}

/// Discovered-capability report printed when no model is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    pub backend: String,
    pub providers: Vec<String>,
    pub accelerator_provider: String,
    pub accelerator_supported: bool,
    /// Every enumerated adapter, unfiltered. `None` when discovery is unavailable.
    pub adapters: Option<Vec<AdapterSummary>>,
    pub enumeration_error: Option<String>,
    pub native_libraries: Vec<NativeLibrary>,
    pub native_stack_available: bool,
}

impl CapabilityReport {
    pub fn collect(env: &RuntimeEnvironment) -> Self {
        let engine = env.engine();
        let providers = engine.available_providers();
        let accelerator_provider = engine.accelerator_provider().to_string();
        let accelerator_supported = providers.iter().any(|p| *p == accelerator_provider);

        let no_filter: &[AdapterAttribute] = &[];
        let (adapters, enumeration_error) = match env.backend().enumerate_adapters(no_filter) {
            Ok(list) => (
                Some(
                    list.into_iter()
                        .map(|a| AdapterSummary {
                            compute_only: a.is_compute_only(),
                            supports_graphics: a.supports_graphics,
                            supports_core_compute: a.supports_core_compute,
                            dedicated_memory_bytes: a.dedicated_memory_bytes,
                            name: a.name,
                        })
                        .collect(),
                ),
                None,
            ),
            Err(e) => (None, Some(e.to_string())),
        };

        let probes = probe_native_runtimes();
        debug!(providers = providers.len(), "collected capability report");
        Self {
            backend: env.backend().name().to_string(),
            providers,
            accelerator_provider,
            accelerator_supported,
            adapters,
            enumeration_error,
            native_stack_available: native_stack_available(&probes),
            native_libraries: probes.iter().map(NativeLibrary::from).collect(),
        }
    }
}
