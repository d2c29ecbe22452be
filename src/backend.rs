//! Kernel provider selection.
//!
//! This module defines the available kernel providers and a process-wide
//! default. Layers capture the [`Kernels`] table of the active backend when
//! they are constructed, so switching backends affects layers created
//! afterwards; a layer can always be pinned to a table with `with_kernels`.
//!
//! # Supported Backends
//!
//! - `Cpu`: single-threaded kernels (default).
//! - `Parallel`: rayon-backed matrix kernels, available with the `parallel`
//!   feature. Selecting it without the feature falls back to `Cpu`.
//!
//! The backend is stored globally in an `AtomicU8`; targets without 8-bit
//! atomics always use `Cpu`.

use core::convert::TryFrom;
#[cfg(target_has_atomic = "8")]
use core::sync::atomic::{AtomicU8, Ordering};

use crate::ops::{Kernels, CPU_KERNELS};

/// Enumeration of kernel providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Backend {
    /// Single-threaded CPU kernels (default).
    #[default]
    Cpu = 0,
    /// Rayon-backed CPU kernels.
    Parallel,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Parallel),
            _ => Err(()),
        }
    }
}

impl Backend {
    /// The kernel table this backend computes with.
    #[must_use]
    pub fn kernels(self) -> &'static Kernels {
        match self {
            #[cfg(feature = "parallel")]
            Self::Parallel => &crate::ops::PARALLEL_KERNELS,
            _ => &CPU_KERNELS,
        }
    }
}

/// Relaxed ordering is enough: the value is read at layer construction only.
#[cfg(target_has_atomic = "8")]
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the backend newly constructed layers compute with.
///
/// # Example
///
/// ```
/// use tinyfes::backend::{get_backend, set_backend, Backend};
/// set_backend(Backend::Cpu);
/// assert_eq!(get_backend(), Backend::Cpu);
/// ```
pub fn set_backend(b: Backend) {
    #[cfg(target_has_atomic = "8")]
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Relaxed);
    #[cfg(not(target_has_atomic = "8"))]
    let _ = b;
}

/// Returns the active backend, defaulting to [`Backend::Cpu`] on an invalid
/// stored value.
#[must_use]
pub fn get_backend() -> Backend {
    #[cfg(target_has_atomic = "8")]
    {
        Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Relaxed)).unwrap_or_default()
    }
    #[cfg(not(target_has_atomic = "8"))]
    Backend::Cpu
}

/// Kernel table of the active backend.
#[must_use]
pub fn kernels() -> &'static Kernels {
    get_backend().kernels()
}
