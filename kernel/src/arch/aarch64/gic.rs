//! Generic Interrupt Controller (GICv2) driver.
//!
//! Two blocks of registers drive interrupt delivery on the QEMU virt
//! machine:
//!
//! - **Distributor (GICD)**: per-interrupt enable, priority, target CPU,
//!   trigger configuration, and group assignment.
//! - **CPU Interface (GICC)**: acknowledge/end-of-interrupt handshake and
//!   the priority mask for the one CPU this kernel runs on.
//!
//! All interrupts are placed in Group 1 (non-secure) so they reach EL1 as
//! IRQ rather than FIQ. ID ranges: SGIs 0-15, PPIs 16-31 (the virtual
//! timer is PPI 27), SPIs 32+ (the UART).

use spin::Mutex;

use super::mmio;
use crate::error::{KernelError, KernelResult};
use crate::platform;
use crate::sync::once_lock::GlobalState;

// ---------------------------------------------------------------------------
// Distributor (GICD) register offsets
// ---------------------------------------------------------------------------

/// Distributor Control Register.
const GICD_CTLR: usize = 0x000;
/// Interrupt Controller Type Register (ITLinesNumber in bits [4:0]).
const GICD_TYPER: usize = 0x004;
/// Interrupt Group Registers (one bit per interrupt).
const GICD_IGROUPR: usize = 0x080;
/// Interrupt Set-Enable Registers (one bit per interrupt).
const GICD_ISENABLER: usize = 0x100;
/// Interrupt Clear-Enable Registers (one bit per interrupt).
const GICD_ICENABLER: usize = 0x180;
/// Interrupt Clear-Pending Registers (one bit per interrupt).
const GICD_ICPENDR: usize = 0x280;
/// Interrupt Priority Registers (one byte per interrupt).
const GICD_IPRIORITYR: usize = 0x400;
/// Interrupt Processor Targets Registers (one byte per interrupt).
const GICD_ITARGETSR: usize = 0x800;
/// Interrupt Configuration Registers (2 bits per interrupt).
const GICD_ICFGR: usize = 0xC00;

// ---------------------------------------------------------------------------
// CPU interface (GICC) register offsets
// ---------------------------------------------------------------------------

/// CPU Interface Control Register.
const GICC_CTLR: usize = 0x000;
/// Interrupt Priority Mask Register.
const GICC_PMR: usize = 0x004;
/// Binary Point Register.
const GICC_BPR: usize = 0x008;
/// Interrupt Acknowledge Register.
const GICC_IAR: usize = 0x00C;
/// End of Interrupt Register.
const GICC_EOIR: usize = 0x010;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum interrupt lines GICv2 supports.
const GIC_MAX_IRQS: u32 = 1020;

/// IAR values at or above this are spurious and must not receive EOI.
const GIC_SPURIOUS_BASE: u32 = 1020;

/// Default priority given to every interrupt at init.
const DEFAULT_PRIORITY: u8 = 0x80;

// ---------------------------------------------------------------------------
// Driver state
// ---------------------------------------------------------------------------

/// GICv2 controller handle.
struct Gic {
    gicd_base: usize,
    gicc_base: usize,
    /// Interrupt lines implemented, read from GICD_TYPER.
    num_irqs: u32,
}

impl Gic {
    const fn new(gicd_base: usize, gicc_base: usize) -> Self {
        Self {
            gicd_base,
            gicc_base,
            num_irqs: 0,
        }
    }

    fn gicd_read(&self, offset: usize) -> u32 {
        // SAFETY: the distributor base covers 64 KiB of GICD registers on
        // the virt machine; offsets come from the constants above.
        unsafe { mmio::read32(self.gicd_base + offset) }
    }

    fn gicd_write(&self, offset: usize, value: u32) {
        // SAFETY: as in `gicd_read`, for the write direction.
        unsafe { mmio::write32(self.gicd_base + offset, value) }
    }

    fn gicc_read(&self, offset: usize) -> u32 {
        // SAFETY: the CPU interface base covers the GICC registers on the
        // virt machine; offsets come from the constants above.
        unsafe { mmio::read32(self.gicc_base + offset) }
    }

    fn gicc_write(&self, offset: usize, value: u32) {
        // SAFETY: as in `gicc_read`, for the write direction.
        unsafe { mmio::write32(self.gicc_base + offset, value) }
    }

    /// Order configuration writes before dependent operations.
    fn barrier() {
        mmio::dsb_sy();
        mmio::isb();
    }

    /// Bring up the distributor: everything disabled, pending state
    /// cleared, Group 1, default priority, CPU 0, level-triggered.
    fn init_distributor(&mut self) {
        // 1. Quiesce while reconfiguring.
        self.gicd_write(GICD_CTLR, 0);
        Self::barrier();

        // ITLinesNumber gives 32 * (N + 1) implemented lines.
        let typer = self.gicd_read(GICD_TYPER);
        let it_lines = typer & 0x1F;
        self.num_irqs = ((it_lines + 1) * 32).min(GIC_MAX_IRQS);

        let num_regs = self.num_irqs.div_ceil(32) as usize;

        for i in 0..num_regs {
            // 4. No interrupt may be left pending from firmware.
            self.gicd_write(GICD_ICPENDR + i * 4, 0xFFFF_FFFF);
            // 5. Group 1 (non-secure) so delivery is IRQ at EL1, not FIQ.
            self.gicd_write(GICD_IGROUPR + i * 4, 0xFFFF_FFFF);
            // Everything starts disabled; drivers enable their own line.
            self.gicd_write(GICD_ICENABLER + i * 4, 0xFFFF_FFFF);
        }

        // 6. Uniform default priority, one byte per interrupt.
        let priority_word = u32::from_ne_bytes([DEFAULT_PRIORITY; 4]);
        for i in 0..(self.num_irqs as usize / 4) {
            self.gicd_write(GICD_IPRIORITYR + i * 4, priority_word);
        }

        // 7. Target CPU 0 for SPIs; ITARGETSR is banked (read-only) for
        // interrupts 0-31, so start at register 8.
        for i in 8..(self.num_irqs as usize / 4) {
            self.gicd_write(GICD_ITARGETSR + i * 4, 0x0101_0101);
        }

        // 8. SPIs level-triggered; the first two ICFGR registers cover
        // the banked SGIs/PPIs and stay at their reset values.
        for i in 2..(self.num_irqs as usize / 16) {
            self.gicd_write(GICD_ICFGR + i * 4, 0x0000_0000);
        }

        Self::barrier();

        // 9a. Enable the distributor (Group 1 forwarding).
        self.gicd_write(GICD_CTLR, 1);
        Self::barrier();
    }

    /// Bring up this CPU's interface: accept every priority, no
    /// preemption grouping, then enable.
    fn init_cpu_interface(&self) {
        // 2. Priority mask fully open.
        self.gicc_write(GICC_PMR, 0xFF);
        // 3. All priority bits used for group priority.
        self.gicc_write(GICC_BPR, 0);
        // 9b. Enable interrupt signaling to this CPU.
        self.gicc_write(GICC_CTLR, 1);
        Self::barrier();
    }

    fn enable_interrupt(&self, id: u32) -> KernelResult<()> {
        if id >= self.num_irqs {
            return Err(KernelError::InvalidArgument {
                name: "id",
                value: "interrupt ID beyond implemented lines",
            });
        }
        let reg = (id / 32) as usize;
        self.gicd_write(GICD_ISENABLER + reg * 4, 1 << (id % 32));
        Self::barrier();
        Ok(())
    }

    fn disable_interrupt(&self, id: u32) -> KernelResult<()> {
        if id >= self.num_irqs {
            return Err(KernelError::InvalidArgument {
                name: "id",
                value: "interrupt ID beyond implemented lines",
            });
        }
        let reg = (id / 32) as usize;
        self.gicd_write(GICD_ICENABLER + reg * 4, 1 << (id % 32));
        Self::barrier();
        Ok(())
    }

    /// Read IAR. The low 10 bits are the interrupt ID; IDs at or above
    /// 1020 mean "nothing pending" and must never be EOI'd.
    fn acknowledge(&self) -> Option<u32> {
        let iar = self.gicc_read(GICC_IAR);
        let id = iar & 0x3FF;
        if id >= GIC_SPURIOUS_BASE {
            None
        } else {
            Some(id)
        }
    }

    /// Retire an interrupt previously returned by [`Gic::acknowledge`].
    fn end_of_interrupt(&self, id: u32) {
        self.gicc_write(GICC_EOIR, id);
        Self::barrier();
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

static GIC: GlobalState<Mutex<Gic>> = GlobalState::new();

/// Initialize the GICv2 for the boot CPU.
///
/// Must run after the vector table is installed and before any interrupt
/// line is enabled.
pub fn init() -> KernelResult<()> {
    let mut gic = Gic::new(platform::GICD_BASE, platform::GICC_BASE);
    gic.init_distributor();
    gic.init_cpu_interface();

    log::info!("GICv2 up: {} interrupt lines, group 1", gic.num_irqs);

    GIC.init(Mutex::new(gic))
        .map_err(|_| KernelError::AlreadyExists {
            resource: "GIC",
            id: 0,
        })
}

/// Enable delivery of an interrupt line.
pub fn enable_irq(id: u32) -> KernelResult<()> {
    GIC.with(|mtx| mtx.lock().enable_interrupt(id))
        .unwrap_or(Err(KernelError::NotInitialized { subsystem: "GIC" }))
}

/// Disable delivery of an interrupt line.
pub fn disable_irq(id: u32) -> KernelResult<()> {
    GIC.with(|mtx| mtx.lock().disable_interrupt(id))
        .unwrap_or(Err(KernelError::NotInitialized { subsystem: "GIC" }))
}

/// Acknowledge the highest-priority pending interrupt.
///
/// Returns `None` for spurious reads (ID >= 1020), which must not be
/// EOI'd. Every `Some(id)` must be paired with exactly one
/// [`end_of_interrupt`] call after the handler finishes.
pub fn acknowledge() -> Option<u32> {
    GIC.with(|mtx| mtx.lock().acknowledge()).flatten()
}

/// Signal end-of-interrupt for an acknowledged ID.
pub fn end_of_interrupt(id: u32) {
    GIC.with(|mtx| mtx.lock().end_of_interrupt(id));
}

/// Whether [`init`] has run.
pub fn is_initialized() -> bool {
    GIC.is_initialized()
}
