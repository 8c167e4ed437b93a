// Print macros for kernel output

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::arch::aarch64::serial::_print(format_args!($($arg)*)));
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

// Host builds have no console; formatting is evaluated and discarded so
// the macros stay warning-free at call sites.
#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
#[macro_export]
macro_rules! println {
    () => {};
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

// The serial variants exist for the test framework and panic paths; on
// this single-UART machine they share the sink with print!.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::print!($($arg)*));
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::println!());
    ($($arg:tt)*) => ($crate::println!($($arg)*));
}
