//! Kernel error types.
//!
//! One structured error enum covers every fallible path in the kernel so
//! that callers can propagate with `?` and match on the failure they care
//! about instead of threading string literals around.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// The page allocator has no free frame left.
    OutOfMemory {
        requested: usize,
        available: usize,
    },
    /// The heap cannot satisfy a request: size too large, fragmentation,
    /// or a corrupt segment chain detected by the bounded traversal.
    NoFit {
        requested: usize,
    },
    /// Misaligned address, zero-size allocation, out-of-range IRQ number,
    /// oversized DMA transfer, and similar caller mistakes.
    InvalidArgument {
        name: &'static str,
        value: &'static str,
    },
    /// A device did not respond within the bounded spin limit.
    DeviceTimeout {
        device: &'static str,
        operation: &'static str,
    },
    /// A device reported failure (e.g. the fw_cfg DMA error bit).
    DeviceError {
        device: &'static str,
        code: u32,
    },
    /// The GIC returned an interrupt ID in the spurious range (>= 1020).
    SpuriousInterrupt {
        id: u32,
    },
    /// An exception class the dispatcher does not recognize.
    Unhandled {
        what: &'static str,
    },
    /// A resource that may only exist once was initialized twice.
    AlreadyExists {
        resource: &'static str,
        id: u64,
    },
    /// A named resource could not be located (e.g. a fw_cfg file).
    NotFound {
        resource: &'static str,
    },
    /// Subsystem used before its `init()` ran.
    NotInitialized {
        subsystem: &'static str,
    },
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "Out of memory: requested {} bytes, {} available",
                requested, available
            ),
            Self::NoFit { requested } => {
                write!(f, "Heap cannot fit a {} byte request", requested)
            }
            Self::InvalidArgument { name, value } => {
                write!(f, "Invalid argument '{}': {}", name, value)
            }
            Self::DeviceTimeout { device, operation } => {
                write!(f, "Timeout on {} during {}", device, operation)
            }
            Self::DeviceError { device, code } => {
                write!(f, "Device error on {}: code 0x{:x}", device, code)
            }
            Self::SpuriousInterrupt { id } => write!(f, "Spurious interrupt {}", id),
            Self::Unhandled { what } => write!(f, "Unhandled: {}", what),
            Self::AlreadyExists { resource, id } => {
                write!(f, "{} with id {} already exists", resource, id)
            }
            Self::NotFound { resource } => write!(f, "{} not found", resource),
            Self::NotInitialized { subsystem } => {
                write!(f, "Subsystem not initialized: {}", subsystem)
            }
        }
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn display_carries_payload() {
        let e = KernelError::OutOfMemory {
            requested: 4096,
            available: 0,
        };
        assert!(std::format!("{}", e).contains("4096"));

        let e = KernelError::DeviceError {
            device: "fw_cfg",
            code: 0x1,
        };
        assert!(std::format!("{}", e).contains("fw_cfg"));
    }
}
