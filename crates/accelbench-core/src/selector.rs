//! Adapter selection.

use accelbench_backend::{AdapterAttribute, AdapterDescriptor, ComputeBackend};
use tracing::{debug, info, warn};

use crate::error::SelectionError;

/// Capability every candidate adapter must advertise.
pub const COMPUTE_FILTER: &[AdapterAttribute] = &[AdapterAttribute::CoreCompute];

/// Picks the adapter the benchmark will run on.
pub struct AdapterSelector<'a> {
    backend: &'a dyn ComputeBackend,
}

impl<'a> AdapterSelector<'a> {
    pub fn new(backend: &'a dyn ComputeBackend) -> Self {
        Self { backend }
    }

    /// Enumerate compute-capable adapters and apply [`choose_adapter`].
    pub fn select_compute_adapter(
        &self,
        prefer_compute_only: bool,
    ) -> Result<AdapterDescriptor, SelectionError> {
        let adapters = self.backend.enumerate_adapters(COMPUTE_FILTER).map_err(|e| {
            if e.is_unavailable() {
                SelectionError::EnumerationUnavailable(e)
            } else {
                SelectionError::EnumerationFailed(e)
            }
        })?;
        let enumerated = adapters.len();
        debug!(backend = self.backend.name(), enumerated, prefer_compute_only, "selecting adapter");

        let Some(adapter) = choose_adapter(adapters, prefer_compute_only) else {
            warn!(enumerated, "no compute-capable adapter");
            return Err(SelectionError::NoSuitableAdapter { enumerated });
        };
        if prefer_compute_only && adapter.supports_graphics {
            warn!(
                adapter = %adapter.name,
                "no compute-only adapter found, falling back to a graphics adapter"
            );
        }
        info!(
            adapter = %adapter.name,
            compute_only = adapter.is_compute_only(),
            "selected adapter"
        );
        Ok(adapter)
    }
}

/// Selection policy over an already-filtered, enumeration-ordered list.
///
/// The first adapter for which `!prefer_compute_only || !supports_graphics`
/// holds wins immediately. When `prefer_compute_only` is set and every
/// adapter is graphics-capable, the first one is taken instead of failing.
pub fn choose_adapter(
    adapters: Vec<AdapterDescriptor>,
    prefer_compute_only: bool,
) -> Option<AdapterDescriptor> {
    let index = adapters
        .iter()
        .position(|a| !prefer_compute_only || !a.supports_graphics)
        .or(if adapters.is_empty() { None } else { Some(0) })?;
    adapters.into_iter().nth(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, graphics: bool) -> AdapterDescriptor {
        AdapterDescriptor {
            id: name.len() as u64,
            name: name.to_string(),
            vendor_id: 0,
            supports_graphics: graphics,
            supports_core_compute: true,
            dedicated_memory_bytes: 0,
        }
    }

    #[test]
    fn compute_only_adapter_wins_when_preferred() {
        let list = vec![adapter("A", true), adapter("B", true), adapter("C", false)];
        assert_eq!(choose_adapter(list, true).unwrap().name, "C");
    }

    #[test]
    fn first_adapter_wins_without_preference() {
        let list = vec![adapter("A", true), adapter("C", false)];
        assert_eq!(choose_adapter(list, false).unwrap().name, "A");
    }

    #[test]
    fn graphics_adapter_is_the_fallback() {
        assert_eq!(choose_adapter(vec![adapter("A", true)], true).unwrap().name, "A");
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert!(choose_adapter(Vec::new(), true).is_none());
        assert!(choose_adapter(Vec::new(), false).is_none());
    }

    #[test]
    fn first_of_several_compute_only_adapters() {
        let list = vec![adapter("G", true), adapter("N1", false), adapter("N2", false)];
        assert_eq!(choose_adapter(list, true).unwrap().name, "N1");
    }
}
