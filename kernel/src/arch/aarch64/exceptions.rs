//! EL1 exception vectors and dispatch.
//!
//! The vector table is 2 KiB aligned with sixteen 128-byte slots in four
//! groups: {current EL, SP_EL0}, {current EL, SP_ELx}, {lower EL
//! AArch64}, {lower EL AArch32}. The kernel runs at EL1 on SP_EL1, so
//! only the second group carries real handlers; every other slot captures
//! state and halts.
//!
//! Each used slot saves `x0..x30` plus `ELR/SPSR/ESR/FAR` into an
//! [`ExceptionFrame`] on the kernel stack, calls the matching Rust
//! dispatcher, restores the frame, and returns with `ERET`. The CPU masks
//! IRQs on entry and `ERET` restores the previous mask, so handlers never
//! nest.

use core::arch::global_asm;

use crate::arch::esr::{Esr, ExceptionClass};
use crate::irq::{self, IrqNumber};

use super::gic;
use super::mmio;

// The prologue/epilogue and the table itself. A 128-byte slot cannot fit
// a full save sequence, so each slot holds a single branch and the real
// entry stubs sit after the table.
global_asm!(
    r#"
.macro SAVE_FRAME
    sub     sp, sp, #288
    stp     x0, x1, [sp, #0]
    stp     x2, x3, [sp, #16]
    stp     x4, x5, [sp, #32]
    stp     x6, x7, [sp, #48]
    stp     x8, x9, [sp, #64]
    stp     x10, x11, [sp, #80]
    stp     x12, x13, [sp, #96]
    stp     x14, x15, [sp, #112]
    stp     x16, x17, [sp, #128]
    stp     x18, x19, [sp, #144]
    stp     x20, x21, [sp, #160]
    stp     x22, x23, [sp, #176]
    stp     x24, x25, [sp, #192]
    stp     x26, x27, [sp, #208]
    stp     x28, x29, [sp, #224]
    str     x30, [sp, #240]
    mrs     x9, elr_el1
    mrs     x10, spsr_el1
    mrs     x11, esr_el1
    mrs     x12, far_el1
    stp     x9, x10, [sp, #256]
    stp     x11, x12, [sp, #272]
.endm

.macro RESTORE_FRAME_ERET
    ldp     x9, x10, [sp, #256]
    msr     elr_el1, x9
    msr     spsr_el1, x10
    ldp     x0, x1, [sp, #0]
    ldp     x2, x3, [sp, #16]
    ldp     x4, x5, [sp, #32]
    ldp     x6, x7, [sp, #48]
    ldp     x8, x9, [sp, #64]
    ldp     x10, x11, [sp, #80]
    ldp     x12, x13, [sp, #96]
    ldp     x14, x15, [sp, #112]
    ldp     x16, x17, [sp, #128]
    ldp     x18, x19, [sp, #144]
    ldp     x20, x21, [sp, #160]
    ldp     x22, x23, [sp, #176]
    ldp     x24, x25, [sp, #192]
    ldp     x26, x27, [sp, #208]
    ldp     x28, x29, [sp, #224]
    ldr     x30, [sp, #240]
    add     sp, sp, #288
    eret
.endm

.macro UNEXPECTED_VECTOR idx
vector_unexpected_\idx:
    SAVE_FRAME
    mov     x0, sp
    mov     x1, #\idx
    bl      handle_unexpected_vector
2:  wfe
    b       2b
.endm

.section .text
.balign 0x800
.global exception_vector_table
exception_vector_table:
    // Group 0: current EL with SP_EL0 -- unused.
    b       vector_unexpected_0
.balign 0x80
    b       vector_unexpected_1
.balign 0x80
    b       vector_unexpected_2
.balign 0x80
    b       vector_unexpected_3

    // Group 1: current EL with SP_ELx -- the kernel's own exceptions.
.balign 0x80
    b       vector_sync
.balign 0x80
    b       vector_irq
.balign 0x80
    b       vector_fiq
.balign 0x80
    b       vector_serror

    // Group 2: lower EL, AArch64 -- no EL0 yet.
.balign 0x80
    b       vector_unexpected_8
.balign 0x80
    b       vector_unexpected_9
.balign 0x80
    b       vector_unexpected_10
.balign 0x80
    b       vector_unexpected_11

    // Group 3: lower EL, AArch32 -- unsupported.
.balign 0x80
    b       vector_unexpected_12
.balign 0x80
    b       vector_unexpected_13
.balign 0x80
    b       vector_unexpected_14
.balign 0x80
    b       vector_unexpected_15

vector_sync:
    SAVE_FRAME
    mov     x0, sp
    bl      handle_sync_exception
    RESTORE_FRAME_ERET

vector_irq:
    SAVE_FRAME
    mov     x0, sp
    bl      handle_irq_exception
    RESTORE_FRAME_ERET

vector_fiq:
    SAVE_FRAME
    mov     x0, sp
    bl      handle_fiq_exception
    RESTORE_FRAME_ERET

vector_serror:
    SAVE_FRAME
    mov     x0, sp
    bl      handle_serror_exception
    RESTORE_FRAME_ERET

UNEXPECTED_VECTOR 0
UNEXPECTED_VECTOR 1
UNEXPECTED_VECTOR 2
UNEXPECTED_VECTOR 3
UNEXPECTED_VECTOR 8
UNEXPECTED_VECTOR 9
UNEXPECTED_VECTOR 10
UNEXPECTED_VECTOR 11
UNEXPECTED_VECTOR 12
UNEXPECTED_VECTOR 13
UNEXPECTED_VECTOR 14
UNEXPECTED_VECTOR 15
"#
);

/// Register state captured by the exception prologue. Layout must match
/// the `SAVE_FRAME` offsets above.
#[repr(C)]
pub struct ExceptionFrame {
    /// x0..x30 at the moment of the exception.
    pub gpr: [u64; 31],
    /// Padding slot keeping the frame a multiple of 16 bytes.
    _reserved: u64,
    pub elr: u64,
    pub spsr: u64,
    pub esr: u64,
    pub far: u64,
}

const _: () = assert!(core::mem::size_of::<ExceptionFrame>() == 288);

/// Install the vector table into `VBAR_EL1`. Must run before IRQs are
/// enabled.
pub fn install() {
    extern "C" {
        static exception_vector_table: u8;
    }

    // SAFETY: exception_vector_table is the 2 KiB-aligned table defined
    // in this module's global_asm; pointing VBAR_EL1 at it is exactly its
    // purpose. The ISB makes the new base visible before any exception
    // can be taken through it.
    unsafe {
        let base = &raw const exception_vector_table as u64;
        core::arch::asm!("msr vbar_el1, {}", in(reg) base, options(nostack, preserves_flags));
    }
    mmio::isb();
}

/// Unmask IRQs at the CPU (`DAIFClr #2`).
#[inline]
pub fn enable_irqs() {
    // SAFETY: clearing the I bit only allows interrupt delivery; the GIC
    // and vector table are set up before bootstrap calls this.
    unsafe {
        core::arch::asm!("msr daifclr, #2", options(nostack, preserves_flags));
    }
}

/// Mask IRQs at the CPU (`DAIFSet #2`).
#[inline]
pub fn disable_irqs() {
    // SAFETY: setting the I bit is always safe; it only defers delivery.
    unsafe {
        core::arch::asm!("msr daifset, #2", options(nostack, preserves_flags));
    }
}

/// Whether IRQs are currently unmasked.
pub fn irqs_enabled() -> bool {
    let daif: u64;
    // SAFETY: reading DAIF has no side effects.
    unsafe {
        core::arch::asm!("mrs {}, daif", out(reg) daif, options(nostack, preserves_flags));
    }
    daif & (1 << 7) == 0
}

/// Run a closure with IRQs masked, restoring the previous mask after.
///
/// Used by kernel-thread code that shares state with interrupt handlers
/// (e.g. the serial receive ring).
pub fn with_irqs_masked<R>(f: impl FnOnce() -> R) -> R {
    let was_enabled = irqs_enabled();
    disable_irqs();
    let result = f();
    if was_enabled {
        enable_irqs();
    }
    result
}

// ---------------------------------------------------------------------------
// Dispatchers
// ---------------------------------------------------------------------------

/// Synchronous exception dispatcher.
///
/// SVCs and BRK are logged and execution continues; every other class is
/// fatal at EL1 and halts after dumping the captured state.
#[no_mangle]
extern "C" fn handle_sync_exception(frame: &mut ExceptionFrame) {
    let esr = Esr(frame.esr);
    match esr.class() {
        ExceptionClass::Svc64 => {
            // No system-call layer yet; record the request and return to
            // the instruction after the SVC (ELR already points there).
            log::info!("svc #{} from ELR {:#x}", esr.svc_immediate(), frame.elr);
        }
        ExceptionClass::BrkInstruction => {
            log::warn!("brk #{} at {:#x}, skipping", esr.svc_immediate(), frame.elr);
            // ELR points at the BRK itself; step over it.
            frame.elr += 4;
        }
        class => fatal("synchronous exception", class, frame),
    }
}

/// IRQ dispatcher: acknowledge, route through the handler table, signal
/// end-of-interrupt. Spurious IDs (>= 1020) are dropped without EOI.
#[no_mangle]
extern "C" fn handle_irq_exception(_frame: &mut ExceptionFrame) {
    match gic::acknowledge() {
        Some(id) => {
            irq::dispatch(IrqNumber::new(id));
            gic::end_of_interrupt(id);
        }
        None => {
            // Spurious: swallowed silently, and writing EOI for it is
            // forbidden by the GIC architecture.
        }
    }
}

/// FIQs are never configured; one arriving means broken interrupt
/// routing.
#[no_mangle]
extern "C" fn handle_fiq_exception(frame: &mut ExceptionFrame) {
    fatal("FIQ", Esr(frame.esr).class(), frame);
}

/// SErrors are unrecoverable by definition.
#[no_mangle]
extern "C" fn handle_serror_exception(frame: &mut ExceptionFrame) {
    fatal("SError", Esr(frame.esr).class(), frame);
}

/// Entry for the twelve vector slots the kernel never expects to take
/// (wrong stack or wrong exception level).
#[no_mangle]
extern "C" fn handle_unexpected_vector(frame: &mut ExceptionFrame, slot: u64) -> ! {
    crate::println!("[EXC] exception through unexpected vector slot {}", slot);
    fatal("unexpected vector", Esr(frame.esr).class(), frame);
}

/// Dump the captured state over serial and halt the CPU.
fn fatal(kind: &str, class: ExceptionClass, frame: &ExceptionFrame) -> ! {
    let esr = Esr(frame.esr);
    crate::println!("[EXC] fatal {}: {}", kind, class);
    crate::println!(
        "[EXC]   ELR={:#018x} ESR={:#010x} EC={:#04x}",
        frame.elr,
        frame.esr,
        esr.ec()
    );
    crate::println!(
        "[EXC]   SPSR={:#018x} FAR={:#018x}",
        frame.spsr,
        frame.far
    );
    super::halt();
}
