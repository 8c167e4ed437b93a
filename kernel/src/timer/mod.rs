//! Tick accounting above the hardware timer.
//!
//! The architecture layer ([`crate::arch::aarch64::timer`] on real
//! hardware) programs the generic timer and calls [`record_tick`] from the
//! interrupt handler. This module owns the monotonic tick counter and the
//! interval arithmetic, which is kept pure so it can be tested on the
//! host.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{KernelError, KernelResult};

/// Monotonic count of timer interrupts since boot.
static TICK_COUNT: AtomicU64 = AtomicU64::new(0);

/// Tick rate the hardware layer programmed, for uptime conversion.
/// Zero until the timer is initialized.
static TICK_RATE_HZ: AtomicU32 = AtomicU32::new(0);

/// Record one timer interrupt. Called from IRQ context.
#[inline]
pub fn record_tick() -> u64 {
    TICK_COUNT.fetch_add(1, Ordering::Relaxed) + 1
}

/// Monotonic tick count since boot.
pub fn tick_count() -> u64 {
    TICK_COUNT.load(Ordering::Relaxed)
}

/// Publish the programmed tick rate. Called once by the hardware layer.
pub fn set_tick_rate(hz: u32) {
    TICK_RATE_HZ.store(hz, Ordering::Relaxed);
}

/// Uptime in milliseconds, derived from the tick counter. Zero before the
/// timer is running.
pub fn uptime_ms() -> u64 {
    let hz = TICK_RATE_HZ.load(Ordering::Relaxed) as u64;
    if hz == 0 {
        return 0;
    }
    tick_count() * 1000 / hz
}

/// Convert a microsecond interval to countdown ticks for a counter running
/// at `frequency_hz`.
///
/// TVAL is a 32-bit countdown, so intervals that do not fit clamp to
/// `u32::MAX`; a zero interval clamps up to one tick so the timer always
/// makes forward progress. A zero frequency is a fatal configuration
/// error.
pub fn ticks_for_interval_us(frequency_hz: u32, interval_us: u64) -> KernelResult<u32> {
    if frequency_hz == 0 {
        return Err(KernelError::InvalidArgument {
            name: "frequency_hz",
            value: "counter frequency is zero",
        });
    }

    let ticks = (frequency_hz as u128 * interval_us as u128) / 1_000_000;
    if ticks > u32::MAX as u128 {
        return Ok(u32::MAX);
    }
    Ok((ticks as u32).max(1))
}

/// Countdown value for a periodic tick at `tick_hz`.
pub fn reload_for_tick_rate(frequency_hz: u32, tick_hz: u32) -> KernelResult<u32> {
    if tick_hz == 0 {
        return Err(KernelError::InvalidArgument {
            name: "tick_hz",
            value: "tick rate is zero",
        });
    }
    ticks_for_interval_us(frequency_hz, 1_000_000 / tick_hz as u64)
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn interval_math() {
        // 100 ms on a 62.5 MHz clock is 6_250_000 ticks.
        assert_eq!(ticks_for_interval_us(62_500_000, 100_000), Ok(6_250_000));
        // 1 s at 1 MHz.
        assert_eq!(ticks_for_interval_us(1_000_000, 1_000_000), Ok(1_000_000));
    }

    #[test]
    fn clamps_oversized_and_zero_intervals() {
        // 2^33 microseconds at 1 MHz overflows the 32-bit countdown.
        let big = 1u64 << 33;
        assert_eq!(ticks_for_interval_us(1_000_000, big), Ok(u32::MAX));
        // Zero clamps up to a single tick.
        assert_eq!(ticks_for_interval_us(1_000_000, 0), Ok(1));
    }

    #[test]
    fn zero_frequency_is_fatal() {
        assert!(ticks_for_interval_us(0, 1000).is_err());
        assert!(reload_for_tick_rate(0, 10).is_err());
        assert!(reload_for_tick_rate(62_500_000, 0).is_err());
    }

    #[test]
    fn tick_counter_is_monotonic() {
        let before = tick_count();
        let seen = record_tick();
        assert!(seen > before);
        assert!(tick_count() >= seen);
    }
}
