//! Mazarin kernel library.
//!
//! A bare-metal AArch64 kernel for the QEMU virt machine: exception
//! vectors, GICv2, the generic timer, a page allocator and boundary-tag
//! heap, a fw_cfg/ramfb display path, and a framebuffer text console.
//!
//! The crate builds for two targets: `aarch64-unknown-none` (the real
//! kernel) and the host, where the hardware-free subsystems compile
//! against the system allocator so their unit tests run under plain
//! `cargo test`.

#![no_std]
#![cfg_attr(target_os = "none", feature(custom_test_frameworks))]
#![cfg_attr(all(target_os = "none", feature = "alloc"), feature(alloc_error_handler))]
#![cfg_attr(all(test, target_os = "none"), no_main)]
#![cfg_attr(target_os = "none", test_runner(crate::test_framework::test_runner))]
#![cfg_attr(target_os = "none", reexport_test_harness_main = "test_main")]

#[cfg(feature = "alloc")]
extern crate alloc;

// Host target: use the system allocator so unit tests allocate normally.
#[cfg(not(target_os = "none"))]
extern crate std;

#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;

pub mod arch;
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod bootstrap;
pub mod drivers;
pub mod error;
pub mod graphics;
pub mod irq;
pub mod logger;
pub mod mm;
pub mod platform;
pub mod sync;
pub mod test_framework;
pub mod timer;
pub mod utils;

// Re-exports for the binary and for tests.
pub use error::{KernelError, KernelResult};
pub use mm::{PhysicalAddress, FRAME_SIZE};
pub use test_framework::{exit_qemu, QemuExitCode, Testable};

/// Heap allocation failure is unrecoverable in a no_std kernel.
#[cfg(all(target_os = "none", feature = "alloc"))]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}

#[cfg(all(test, target_os = "none"))]
#[no_mangle]
extern "C" fn _start() -> ! {
    test_main();
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(all(test, target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}

// Smoke tests that run on the bare-metal test harness; the substantive
// suites live next to each subsystem and run on the host.
#[cfg(all(test, target_os = "none"))]
mod kernel_tests {
    use crate::arch::esr::{Esr, ExceptionClass};
    use crate::drivers::fw_cfg;

    #[test_case]
    fn dma_descriptor_wire_layout() {
        let control = fw_cfg::dma_control(
            0x0022,
            fw_cfg::DmaControl::SELECT | fw_cfg::DmaControl::WRITE,
        );
        let bytes = fw_cfg::encode_dma_descriptor(control, 28, 0x4123_4560);
        assert_eq!(&bytes[0..4], &[0x00, 0x22, 0x00, 0x18]);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x1C]);
    }

    #[test_case]
    fn esr_class_decode() {
        assert_eq!(Esr(0x15u64 << 26).class(), ExceptionClass::Svc64);
    }

    #[test_case]
    fn tick_conversion_clamps() {
        assert_eq!(
            crate::timer::ticks_for_interval_us(1_000_000, 1 << 33),
            Ok(u32::MAX)
        );
    }
}
