//! ARM semihosting calls.
//!
//! With `-semihosting-config enable=on` QEMU services `HLT #0xF000`
//! traps from the guest. Only `SYS_EXIT` is used here: it terminates the
//! emulator run and carries an exit code, which is how an intentional
//! end-of-run (and the test harness verdict) is signaled.

/// SYS_EXIT operation number.
const SYS_EXIT: u64 = 0x18;

/// "Application exit" stop reason for SYS_EXIT.
const ADP_STOPPED_APPLICATION_EXIT: u64 = 0x20026;

/// SYS_EXIT parameter block (reason, subcode) per the semihosting spec.
#[repr(C)]
struct ExitBlock {
    reason: u64,
    subcode: u64,
}

/// Terminate the QEMU run with the given exit code.
///
/// Without a semihosting-enabled host this traps into the exception
/// path instead; the trailing WFE loop covers a host that ignores the
/// call entirely.
pub fn exit(code: u32) -> ! {
    let block = ExitBlock {
        reason: ADP_STOPPED_APPLICATION_EXIT,
        subcode: code as u64,
    };
    // SAFETY: HLT #0xF000 is the AArch64 semihosting trap; x0 selects
    // SYS_EXIT and x1 points at a live parameter block. The host
    // terminates the VM, and the WFE loop parks the CPU if it does not.
    unsafe {
        core::arch::asm!(
            "hlt #0xF000",
            "1:",
            "wfe",
            "b 1b",
            in("x0") SYS_EXIT,
            in("x1") &block as *const ExitBlock as u64,
            options(noreturn)
        );
    }
}
