//! Platform configuration for the QEMU `virt` machine.
//!
//! Every address and interrupt number the drivers need lives here, so the
//! drivers themselves take configuration instead of embedding magic
//! numbers. Values match the QEMU `virt` board at EL1 with the kernel
//! running identity-mapped.

/// PL011 UART MMIO base.
pub const UART_BASE: usize = 0x0900_0000;

/// GIC Distributor base address.
pub const GICD_BASE: usize = 0x0800_0000;

/// GIC CPU Interface base address.
pub const GICC_BASE: usize = 0x0801_0000;

/// fw_cfg MMIO base (data at +0x00, selector at +0x08, DMA at +0x10).
pub const FWCFG_BASE: usize = 0x0902_0000;

/// Physical load address of the kernel image (ROM/flash window).
pub const KERNEL_LOAD_ADDR: usize = 0x0020_0000;

/// Start of guest RAM.
pub const RAM_BASE: usize = 0x4000_0000;

/// The DTB occupies the first MiB of RAM; nothing below this is allocated.
pub const DTB_RESERVED_END: usize = 0x4010_0000;

/// Top of the boot stack; the stack grows down from here.
pub const STACK_TOP: usize = 0x6000_0000;

/// Boot stack size in bytes.
pub const STACK_SIZE: usize = 1024 * 1024;

/// Highest RAM address handed to the page allocator. The boot stack sits
/// above this so allocations can never collide with it.
pub const MEMORY_END: usize = STACK_TOP - STACK_SIZE;

/// Frames reserved for the kernel heap at page-allocator init (16 MiB).
pub const HEAP_FRAMES: usize = 4096;

/// EL1 virtual timer private peripheral interrupt.
pub const TIMER_VIRT_IRQ: u32 = 27;

/// EL1 physical timer private peripheral interrupt.
pub const TIMER_PHYS_IRQ: u32 = 30;

/// PL011 shared peripheral interrupt. The exact SPI comes from the device
/// tree on real firmware; this is the QEMU virt wiring. Treated as
/// configuration, not a driver constant.
pub const UART_IRQ: u32 = 33;

/// Fallback system counter frequency when CNTFRQ_EL0 reads zero
/// (62.5 MHz, the QEMU virt default).
pub const TIMER_FALLBACK_HZ: u32 = 62_500_000;

/// Periodic tick rate programmed into the virtual timer.
pub const TICK_HZ: u32 = 10;

/// Display geometry negotiated with ramfb.
pub const DISPLAY_WIDTH: u32 = 640;
pub const DISPLAY_HEIGHT: u32 = 480;

/// Console colors (XRGB8888): light gray on black.
pub const CONSOLE_FG: u32 = 0x00AA_AAAA;
pub const CONSOLE_BG: u32 = 0x0000_0000;
