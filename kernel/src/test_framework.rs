//! Bare-metal test support.
//!
//! Reports test progress over serial and ends the QEMU run through the
//! semihosting exit, so a test boot produces a process exit code the
//! harness outside can check.

use core::panic::PanicInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0,
    Failed = 1,
}

/// Trait all testable functions implement.
pub trait Testable {
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        crate::serial_print!("{}...\t", core::any::type_name::<T>());
        self();
        crate::serial_println!("[ok]");
    }
}

/// Custom test runner for `#[test_case]` tests on bare metal.
pub fn test_runner(tests: &[&dyn Testable]) {
    crate::serial_println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    crate::serial_println!("All tests passed");
    exit_qemu(QemuExitCode::Success);
}

/// Panic handler for test builds: report and fail the run.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    crate::serial_println!("[failed]");
    crate::serial_println!("Error: {}", info);
    exit_qemu(QemuExitCode::Failed)
}

/// End the emulator run with the given verdict.
pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    #[cfg(all(target_arch = "aarch64", target_os = "none"))]
    crate::arch::aarch64::semihosting::exit(exit_code as u32);

    #[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
    std::process::exit(exit_code as u32 as i32);
}
