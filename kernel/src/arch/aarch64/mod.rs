//! AArch64 architecture support for the QEMU virt machine.

#[cfg(not(test))]
pub mod boot;
pub mod exceptions;
pub mod gic;
pub mod mmio;
pub mod semihosting;
pub mod serial;
pub mod timer;

use cortex_a::asm;

pub use exceptions::{disable_irqs, enable_irqs};

/// Park the CPU forever.
pub fn halt() -> ! {
    loop {
        asm::wfe();
    }
}

/// Sleep until the next interrupt (or event) arrives.
#[inline]
pub fn idle() {
    asm::wfi();
}
