//! `log` facade sink.
//!
//! Routes `log::info!` and friends to the serial console with a level
//! tag and the originating module. Installed once during bootstrap; log
//! records emitted earlier (or on hosts without a UART) vanish, which is
//! the facade's documented behavior.

use log::{LevelFilter, Log, Metadata, Record};

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        crate::println!(
            "[{:>5}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install the kernel logger. Idempotent: a second call loses the race
/// inside `set_logger` and changes nothing.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}
