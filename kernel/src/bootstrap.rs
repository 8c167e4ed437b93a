//! Staged kernel bring-up.
//!
//! Subsystems come up in dependency order: serial and logging first so
//! every later stage can report, then memory, the exception vectors, the
//! display, the interrupt controller, and finally the timer. Only after
//! all of that are IRQs unmasked and the idle loop entered.

use crate::arch::aarch64::{exceptions, gic, serial, timer as hw_timer};
use crate::drivers::ramfb;
use crate::graphics::{fbcon, Console};
use crate::{logger, mm, platform};

extern "C" {
    /// End of the kernel image (data + BSS), from the linker script.
    static __kernel_end: u8;
}

/// Bring the kernel up and run forever. Called from `kernel_main`.
pub fn run() -> ! {
    // Stage 1: console and logging.
    serial::init();
    crate::println!();
    crate::println!(
        "Mazarin {} (aarch64, QEMU virt, EL1)",
        env!("CARGO_PKG_VERSION")
    );
    logger::init();

    // Stage 2: memory. QEMU virt passes a DTB rather than ATAGs, so the
    // ATAG path yields the platform fallback size.
    // SAFETY: __kernel_end is a linker symbol; only its address is used.
    let kernel_end = unsafe { &raw const __kernel_end as usize };
    let memory_end = platform::RAM_BASE + mm::atags::memory_size(None, platform::MEMORY_END - platform::RAM_BASE);

    // SAFETY: the region between the kernel image and memory_end is RAM
    // that nothing else owns, and this runs once before any allocation.
    let heap_region = match unsafe {
        mm::page::init(
            platform::RAM_BASE,
            kernel_end,
            memory_end,
            platform::HEAP_FRAMES,
        )
    } {
        Ok(region) => region,
        Err(e) => panic!("page allocator init failed: {}", e),
    };
    let frames = mm::page::stats();
    log::info!(
        "page allocator: {} frames ({} free, {} kernel)",
        frames.total,
        frames.free,
        frames.kernel
    );

    // SAFETY: heap_region was reserved by the page allocator for exactly
    // this purpose and is used once.
    if let Err(e) = unsafe { mm::heap::init(heap_region) } {
        panic!("heap init failed: {}", e);
    }
    log::info!(
        "heap: {} KiB at {:#x}",
        heap_region.size / 1024,
        heap_region.base.as_u64()
    );

    // Stage 3: exception vectors, before any interrupt can fire.
    exceptions::install();
    log::info!("exception vectors installed");

    // Stage 4: display. The serial console carries everything the
    // framebuffer does, so a missing ramfb device is not fatal.
    match ramfb::init(platform::DISPLAY_WIDTH, platform::DISPLAY_HEIGHT) {
        Ok(fb) => match Console::new(fb, platform::CONSOLE_FG, platform::CONSOLE_BG) {
            Ok(console) => {
                if fbcon::init(console).is_ok() {
                    log::info!("framebuffer console up");
                }
            }
            Err(e) => log::warn!("framebuffer console unavailable: {}", e),
        },
        Err(e) => log::warn!("display unavailable: {}", e),
    }

    // Stage 5: interrupt controller and the serial receive path.
    if let Err(e) = gic::init() {
        panic!("GIC init failed: {}", e);
    }
    if let Err(e) = serial::enable_receive_interrupt() {
        log::warn!("serial receive interrupt unavailable: {}", e);
    }

    // Stage 6: periodic tick.
    if let Err(e) = hw_timer::init(platform::TICK_HZ) {
        panic!("timer init failed: {}", e);
    }

    exceptions::enable_irqs();
    log::info!("IRQs enabled, entering idle loop");

    crate::print!("Hello, Mazarin!\r\n");
    fbcon::write_str("Hello, Mazarin!\r\n");

    // Idle loop: the timer ticks, the UART feeds the ring, and anything
    // typed comes back out both consoles.
    let uart = serial::Pl011Uart::new(platform::UART_BASE);
    loop {
        while let Some(byte) = serial::read_byte() {
            let _ = uart.putc(byte);
            fbcon::write_byte(byte);
        }
        crate::arch::idle();
    }
}
