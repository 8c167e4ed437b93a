//! Kernel entry glue.
//!
//! The assembly stub in `boot.S` parks secondary cores and sets the
//! stack; `_start_rust` then copies the data image out of flash, clears
//! BSS, and hands control to `kernel_main`.

use core::arch::global_asm;

global_asm!(include_str!("boot.S"));

extern "C" {
    fn kernel_main() -> !;

    // Linker-script symbols. The address of each symbol is the value.
    static __data_load_start: u8;
    static mut __data_start: u8;
    static mut __data_end: u8;
    static mut __bss_start: u8;
    static mut __bss_end: u8;
}

/// First Rust code after reset.
#[no_mangle]
pub extern "C" fn _start_rust() -> ! {
    // SAFETY: runs once, single-core, before anything references .data
    // or .bss. The linker guarantees the symbol ranges are valid and the
    // data image at its load address matches the .data span.
    unsafe {
        let data_start = &raw mut __data_start;
        let data_end = &raw mut __data_end;
        let data_len = data_end as usize - data_start as usize;
        core::ptr::copy_nonoverlapping(&raw const __data_load_start, data_start, data_len);

        let bss_start = &raw mut __bss_start;
        let bss_end = &raw mut __bss_end;
        let bss_len = bss_end as usize - bss_start as usize;
        core::ptr::write_bytes(bss_start, 0, bss_len);

        kernel_main()
    }
}
