//! Native runtime detection via dynamic loading.
//!
//! Reports which of the platform libraries a hardware backend would need
//! (device discovery, device creation, accelerator runtime) can be loaded
//! on this host. Nothing is called through the loaded libraries.

use std::fmt;

use tracing::{debug, info};

/// A platform library needed by a native accelerator backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeRuntime {
    /// Adapter enumeration (DXCore).
    DeviceDiscovery,
    /// Device and queue creation (Direct3D 12).
    DeviceCreation,
    /// Operator runtime bound to a device and queue (DirectML).
    AcceleratorRuntime,
}

impl NativeRuntime {
    pub const ALL: [Self; 3] =
        [Self::DeviceDiscovery, Self::DeviceCreation, Self::AcceleratorRuntime];

    /// File name of the shared library for the current platform.
    pub const fn library_name(self) -> &'static str {
        #[cfg(target_os = "windows")]
        {
            match self {
                Self::DeviceDiscovery => "dxcore.dll",
                Self::DeviceCreation => "d3d12.dll",
                Self::AcceleratorRuntime => "DirectML.dll",
            }
        }
        #[cfg(not(target_os = "windows"))]
        {
            // WSL and DirectX-Headers builds ship these names.
            match self {
                Self::DeviceDiscovery => "libdxcore.so",
                Self::DeviceCreation => "libd3d12.so",
                Self::AcceleratorRuntime => "libdirectml.so",
            }
        }
    }
}

impl fmt::Display for NativeRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceDiscovery => write!(f, "device discovery"),
            Self::DeviceCreation => write!(f, "device creation"),
            Self::AcceleratorRuntime => write!(f, "accelerator runtime"),
        }
    }
}

/// Load result for one native library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeProbe {
    pub runtime: NativeRuntime,
    pub library: &'static str,
    pub available: bool,
    /// Loader error when unavailable.
    pub detail: Option<String>,
}

/// Try to load `runtime`'s library.
pub fn probe_runtime(runtime: NativeRuntime) -> RuntimeProbe {
    let library = runtime.library_name();
    // SAFETY: loading runs the library's initialisers. These are system
    // libraries and the handle is dropped immediately.
    let loaded = unsafe { libloading::Library::new(library) };
    match loaded {
        Ok(_) => {
            debug!(library, %runtime, "native runtime loaded");
            RuntimeProbe { runtime, library, available: true, detail: None }
        }
        Err(e) => {
            debug!(library, %runtime, error = %e, "native runtime not loadable");
            RuntimeProbe { runtime, library, available: false, detail: Some(e.to_string()) }
        }
    }
}

/// Probe every [`NativeRuntime`].
pub fn probe_native_runtimes() -> Vec<RuntimeProbe> {
    let probes: Vec<_> = NativeRuntime::ALL.into_iter().map(probe_runtime).collect();
    let available = probes.iter().filter(|p| p.available).count();
    info!(available, total = probes.len(), "probed native accelerator runtimes");
    probes
}

/// `true` when every library a native backend needs can be loaded.
pub fn native_stack_available(probes: &[RuntimeProbe]) -> bool {
    NativeRuntime::ALL
        .iter()
        .all(|rt| probes.iter().any(|p| p.runtime == *rt && p.available))
}
