//! PL011 UART driver.
//!
//! Byte transmit/receive on the QEMU virt serial port. The transmit path
//! polls the FIFO with a bounded spin; receive is interrupt-driven into a
//! byte ring once the GIC is up.

use core::fmt;

use bitflags::bitflags;
use spin::Mutex;

use super::mmio;
use crate::error::{KernelError, KernelResult};
use crate::irq::{self, IrqNumber};
use crate::platform;
use crate::utils::ring::ByteRing;

// PL011 register offsets.
const UART_DR: usize = 0x00;
const UART_FR: usize = 0x18;
const UART_IBRD: usize = 0x24;
const UART_FBRD: usize = 0x28;
const UART_LCRH: usize = 0x2C;
const UART_CR: usize = 0x30;
const UART_IMSC: usize = 0x38;
const UART_ICR: usize = 0x44;

/// Spin bound for a stuck transmit FIFO.
const TX_SPIN_LIMIT: usize = 100_000;

bitflags! {
    /// Flag register bits.
    struct Flags: u32 {
        const BUSY = 1 << 3;
        /// Receive FIFO empty.
        const RXFE = 1 << 4;
        /// Transmit FIFO full.
        const TXFF = 1 << 5;
    }
}

bitflags! {
    /// Control register bits.
    struct Control: u32 {
        const UARTEN = 1 << 0;
        const TXE = 1 << 8;
        const RXE = 1 << 9;
    }
}

bitflags! {
    /// Line control bits.
    struct LineControl: u32 {
        /// Enable FIFOs.
        const FEN = 1 << 4;
        /// 8-bit words (both WLEN bits).
        const WLEN_8 = 0b11 << 5;
    }
}

bitflags! {
    /// Interrupt mask / clear bits (shared layout of IMSC and ICR).
    struct Interrupts: u32 {
        const RX = 1 << 4;
        const TX = 1 << 5;
    }
}

/// PL011 handle. Stateless beyond the MMIO base, so a fresh instance per
/// call site is fine (and keeps the print path lock-free for use from
/// exception handlers).
pub struct Pl011Uart {
    base: usize,
}

impl Pl011Uart {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    /// Program 8N1 with FIFOs and enable transmit + receive.
    pub fn init(&self) {
        // SAFETY: all offsets below are PL011 registers inside the UART
        // MMIO window configured by the platform.
        unsafe {
            // Disable while reprogramming, and drop stale interrupts.
            mmio::write32(self.base + UART_CR, 0);
            mmio::write32(self.base + UART_ICR, 0x7FF);

            // 115200 baud against the 24 MHz virt UART clock. QEMU does
            // not model the divisor but real PL011s need it.
            mmio::write32(self.base + UART_IBRD, 13);
            mmio::write32(self.base + UART_FBRD, 2);

            mmio::write32(
                self.base + UART_LCRH,
                (LineControl::FEN | LineControl::WLEN_8).bits(),
            );
            // Interrupts stay masked until the GIC path is wired.
            mmio::write32(self.base + UART_IMSC, 0);
            mmio::write32(
                self.base + UART_CR,
                (Control::UARTEN | Control::TXE | Control::RXE).bits(),
            );
        }
        mmio::dsb_sy();
    }

    fn flags(&self) -> Flags {
        // SAFETY: UART_FR is a PL011 register inside the UART window.
        Flags::from_bits_truncate(unsafe { mmio::read32(self.base + UART_FR) })
    }

    /// Transmit one byte, spinning while the FIFO is full (bounded).
    pub fn putc(&self, byte: u8) -> KernelResult<()> {
        let mut spins = 0;
        while self.flags().contains(Flags::TXFF) {
            spins += 1;
            if spins >= TX_SPIN_LIMIT {
                return Err(KernelError::DeviceTimeout {
                    device: "pl011",
                    operation: "transmit FIFO drain",
                });
            }
            core::hint::spin_loop();
        }
        // SAFETY: UART_DR is a PL011 register inside the UART window.
        unsafe { mmio::write8(self.base + UART_DR, byte) };
        Ok(())
    }

    /// Receive one byte if the FIFO holds any.
    pub fn try_getc(&self) -> Option<u8> {
        if self.flags().contains(Flags::RXFE) {
            return None;
        }
        // SAFETY: UART_DR is a PL011 register inside the UART window.
        Some(unsafe { mmio::read8(self.base + UART_DR) })
    }

    /// Unmask the receive interrupt.
    fn enable_rx_interrupt(&self) {
        // SAFETY: UART_IMSC is a PL011 register inside the UART window.
        unsafe { mmio::write32(self.base + UART_IMSC, Interrupts::RX.bits()) };
        mmio::dsb_sy();
    }

    /// Clear latched receive interrupt state.
    fn clear_rx_interrupt(&self) {
        // SAFETY: UART_ICR is a PL011 register inside the UART window.
        unsafe { mmio::write32(self.base + UART_ICR, Interrupts::RX.bits()) };
    }
}

impl fmt::Write for Pl011Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            // A full FIFO that never drains means the backend is gone;
            // dropping output beats wedging the kernel.
            if self.putc(byte).is_err() {
                break;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Receive ring
// ---------------------------------------------------------------------------

static RX_RING: Mutex<ByteRing<256>> = Mutex::new(ByteRing::new());

/// Receive-interrupt handler: drain the FIFO into the ring.
fn handle_rx_irq(_irq: IrqNumber) {
    let uart = Pl011Uart::new(platform::UART_BASE);
    uart.clear_rx_interrupt();
    let mut ring = RX_RING.lock();
    while let Some(byte) = uart.try_getc() {
        // A full ring drops input; serial paste bursts are best-effort.
        let _ = ring.push(byte);
    }
}

/// Pop one received byte, if any.
pub fn read_byte() -> Option<u8> {
    // The RX interrupt takes this lock too, so keep it masked while the
    // kernel thread holds the ring.
    super::exceptions::with_irqs_masked(|| RX_RING.lock().pop())
}

// ---------------------------------------------------------------------------
// Module interface
// ---------------------------------------------------------------------------

/// Bring up the boot UART. Safe to call before anything else.
pub fn init() {
    Pl011Uart::new(platform::UART_BASE).init();
}

/// Route receive interrupts: register the handler, enable the SPI at the
/// GIC, and unmask RX in the UART. Requires the GIC to be initialized.
pub fn enable_receive_interrupt() -> KernelResult<()> {
    irq::register_handler(IrqNumber::new(platform::UART_IRQ), handle_rx_irq)?;
    super::gic::enable_irq(platform::UART_IRQ)?;
    Pl011Uart::new(platform::UART_BASE).enable_rx_interrupt();
    Ok(())
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    let mut uart = Pl011Uart::new(platform::UART_BASE);
    let _ = uart.write_fmt(args);
}
