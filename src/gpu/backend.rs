use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[cfg(feature = "dashi-serde")]
use serde::{Deserialize, Serialize};

use super::error::{GPUError, Result};

/// Native graphics API a device runs on.
///
/// `Default` is not a backend of its own; it resolves to the first supported
/// entry of [`default_fallback_list`].
#[repr(u32)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum Backend {
    #[default]
    Default,
    D3D11,
    D3D12,
    Vulkan,
    Metal,
    OpenGL,
    Empty,
}

impl Backend {
    /// Every backend except `Default`, in probe order.
    pub const CONCRETE: [Backend; 6] = [
        Backend::D3D11,
        Backend::D3D12,
        Backend::Vulkan,
        Backend::Metal,
        Backend::OpenGL,
        Backend::Empty,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Default => "default",
            Backend::D3D11 => "d3d11",
            Backend::D3D12 => "d3d12",
            Backend::Vulkan => "vulkan",
            Backend::Metal => "metal",
            Backend::OpenGL => "opengl",
            Backend::Empty => "empty",
        }
    }

    pub fn is_concrete(self) -> bool {
        self != Backend::Default
    }

    fn probe_index(self) -> Option<usize> {
        Self::CONCRETE.iter().position(|b| *b == self)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = GPUError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        std::iter::once(Backend::Default)
            .chain(Backend::CONCRETE)
            .find(|b| b.name() == lowered)
            .ok_or_else(|| GPUError::invalid(format!("unknown backend name `{s}`")))
    }
}

/// Ordered candidates `Backend::Default` resolves to on this platform.
/// `Empty` never appears here; it has to be asked for.
pub fn default_fallback_list() -> &'static [Backend] {
    #[cfg(target_os = "windows")]
    {
        &[Backend::D3D12, Backend::D3D11, Backend::Vulkan]
    }
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        &[Backend::Metal, Backend::Vulkan]
    }
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        &[Backend::Vulkan, Backend::OpenGL]
    }
    #[cfg(not(any(
        target_os = "windows",
        target_os = "macos",
        target_os = "ios",
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    )))]
    {
        &[Backend::Vulkan]
    }
}

/// Process-wide support cache. Each slot is written at most once, by the
/// first probe of that backend, and read freely afterwards.
struct CapabilityRegistry {
    probes: [OnceLock<bool>; 6],
    available: OnceLock<Vec<Backend>>,
}

static REGISTRY: CapabilityRegistry = CapabilityRegistry {
    probes: [
        OnceLock::new(),
        OnceLock::new(),
        OnceLock::new(),
        OnceLock::new(),
        OnceLock::new(),
        OnceLock::new(),
    ],
    available: OnceLock::new(),
};

fn probe(backend: Backend) -> bool {
    let supported = match backend {
        Backend::Empty => true,
        #[cfg(feature = "dashi-vulkan")]
        Backend::Vulkan => super::vulkan::probe(),
        _ => false,
    };
    log::debug!("backend probe: {backend} supported = {supported}");
    supported
}

/// Whether `backend` can be created in this process. `Default` is supported
/// when any of its fallback candidates is.
pub fn is_backend_supported(backend: Backend) -> bool {
    match backend.probe_index() {
        Some(idx) => *REGISTRY.probes[idx].get_or_init(|| probe(backend)),
        None => default_fallback_list()
            .iter()
            .any(|b| is_backend_supported(*b)),
    }
}

/// Every concrete backend this process supports. Computed on first call.
pub fn available_backends() -> &'static [Backend] {
    REGISTRY.available.get_or_init(|| {
        Backend::CONCRETE
            .iter()
            .copied()
            .filter(|b| is_backend_supported(*b))
            .collect()
    })
}

/// Picks the backend a device will be created on.
pub fn resolve_backend(preferred: Backend) -> Result<Backend> {
    let candidates: &[Backend] = if preferred == Backend::Default {
        default_fallback_list()
    } else {
        std::slice::from_ref(&preferred)
    };

    candidates
        .iter()
        .copied()
        .find(|b| is_backend_supported(*b))
        .ok_or(GPUError::BackendUnsupported(preferred))
}
