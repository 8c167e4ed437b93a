//! ARM generic timer (EL1 virtual timer).
//!
//! The virtual timer counts down `CNTV_TVAL_EL0` at the frequency in
//! `CNTFRQ_EL0` and raises PPI 27 when it hits zero. The tick handler
//! reloads the countdown, bumps the monotonic tick counter, and performs
//! one unit of foreground work (a heartbeat glyph on the console).

use crate::error::{KernelError, KernelResult};
use crate::graphics::fbcon;
use crate::irq::{self, IrqNumber};
use crate::platform;
use crate::sync::once_lock::GlobalState;
use crate::timer;

use super::gic;

/// CNTV_CTL_EL0: counter enable.
const CTL_ENABLE: u64 = 1 << 0;

/// Programmed timer parameters.
struct TimerDriver {
    frequency_hz: u32,
    reload_ticks: u32,
}

static TIMER: GlobalState<TimerDriver> = GlobalState::new();

/// Read the system counter frequency (`CNTFRQ_EL0`).
fn read_cntfrq() -> u64 {
    let freq: u64;
    // SAFETY: CNTFRQ_EL0 is readable at EL1 with no side effects.
    unsafe {
        core::arch::asm!("mrs {}, CNTFRQ_EL0", out(reg) freq, options(nostack, preserves_flags));
    }
    freq
}

/// Read the virtual counter (`CNTVCT_EL0`).
pub fn read_counter() -> u64 {
    let count: u64;
    // SAFETY: CNTVCT_EL0 is readable at EL1 with no side effects.
    unsafe {
        core::arch::asm!("mrs {}, CNTVCT_EL0", out(reg) count, options(nostack, preserves_flags));
    }
    count
}

/// Program the 32-bit countdown (`CNTV_TVAL_EL0`).
fn set_countdown(ticks: u32) {
    // SAFETY: CNTV_TVAL_EL0 is writable at EL1; programming the
    // countdown only affects when the timer PPI fires.
    unsafe {
        core::arch::asm!(
            "msr CNTV_TVAL_EL0, {}",
            in(reg) ticks as u64,
            options(nostack, preserves_flags)
        );
    }
}

/// Write the timer control register (`CNTV_CTL_EL0`).
fn set_control(value: u64) {
    // SAFETY: CNTV_CTL_EL0 is writable at EL1; the ISB orders the
    // control change against subsequent counter reads.
    unsafe {
        core::arch::asm!("msr CNTV_CTL_EL0, {}", in(reg) value, options(nostack, preserves_flags));
    }
    super::mmio::isb();
}

/// Start the periodic tick at `tick_hz`.
///
/// Reads the counter frequency (falling back to the platform constant
/// when the register is unreliable), programs the first countdown, wires
/// PPI 27 through the GIC, and enables the timer with its interrupt
/// unmasked. A frequency of zero after fallback is a fatal configuration
/// error.
pub fn init(tick_hz: u32) -> KernelResult<()> {
    let mut frequency_hz = read_cntfrq() as u32;
    if frequency_hz == 0 {
        log::warn!(
            "CNTFRQ_EL0 reads zero, assuming {} Hz",
            platform::TIMER_FALLBACK_HZ
        );
        frequency_hz = platform::TIMER_FALLBACK_HZ;
    }

    let reload_ticks = timer::reload_for_tick_rate(frequency_hz, tick_hz)?;

    // Quiesce while programming.
    set_control(0);
    set_countdown(reload_ticks);

    irq::register_handler(IrqNumber::new(platform::TIMER_VIRT_IRQ), handle_timer_irq)?;
    gic::enable_irq(platform::TIMER_VIRT_IRQ)?;
    timer::set_tick_rate(tick_hz);

    TIMER
        .init(TimerDriver {
            frequency_hz,
            reload_ticks,
        })
        .map_err(|_| KernelError::AlreadyExists {
            resource: "generic timer",
            id: 0,
        })?;

    // Enable with the interrupt unmasked (IMASK clear).
    set_control(CTL_ENABLE);

    log::info!(
        "virtual timer: {} Hz counter, {} Hz tick (reload {})",
        frequency_hz,
        tick_hz,
        reload_ticks
    );
    Ok(())
}

/// Tick handler: count, reprogram the next period, heartbeat.
fn handle_timer_irq(_irq: IrqNumber) {
    timer::record_tick();

    let reload = TIMER
        .with(|t| t.reload_ticks)
        .unwrap_or(platform::TIMER_FALLBACK_HZ / platform::TICK_HZ);
    set_countdown(reload);

    fbcon::write_byte_irq(b'.');
}

/// The counter frequency in use, once the timer is initialized.
pub fn frequency_hz() -> Option<u32> {
    TIMER.with(|t| t.frequency_hz)
}

/// Re-arm the countdown for a one-shot interval.
///
/// Intervals beyond the 32-bit countdown clamp to `u32::MAX` ticks.
pub fn set_interval_us(interval_us: u64) -> KernelResult<()> {
    let frequency_hz = frequency_hz().ok_or(KernelError::NotInitialized {
        subsystem: "generic timer",
    })?;
    let ticks = timer::ticks_for_interval_us(frequency_hz, interval_us)?;
    set_countdown(ticks);
    Ok(())
}
