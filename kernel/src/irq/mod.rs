//! IRQ handler registry.
//!
//! Maps GIC interrupt IDs to handler functions. The table is a flat array
//! of function pointers -- handlers are installed by kernel code before
//! interrupts are enabled and consulted from IRQ context, so no dynamic
//! dispatch or allocation is involved.

use spin::Mutex;

use crate::error::{KernelError, KernelResult};

/// Highest interrupt ID the GICv2 can deliver; 1020..=1023 are reserved
/// (1023 = spurious).
pub const MAX_IRQS: usize = 1020;

/// Architecture-independent IRQ number.
///
/// Wraps a `u32` to keep raw integers from being passed where an
/// interrupt ID is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IrqNumber(pub u32);

impl IrqNumber {
    pub const fn new(irq: u32) -> Self {
        Self(irq)
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for IrqNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for IrqNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "IRQ#{}", self.0)
    }
}

/// Type alias for IRQ handler functions.
///
/// Handlers run in IRQ context between GIC acknowledge and end-of-
/// interrupt, with IRQs masked by the exception entry.
pub type IrqHandler = fn(IrqNumber);

struct IrqTable {
    handlers: [Option<IrqHandler>; MAX_IRQS],
    dispatched: u64,
    unhandled: u64,
}

impl IrqTable {
    const fn new() -> Self {
        Self {
            handlers: [None; MAX_IRQS],
            dispatched: 0,
            unhandled: 0,
        }
    }
}

static IRQ_TABLE: Mutex<IrqTable> = Mutex::new(IrqTable::new());

/// Register a handler for the given interrupt ID.
///
/// Only one handler may be registered per ID; a second registration
/// returns `AlreadyExists`.
pub fn register_handler(irq: IrqNumber, handler: IrqHandler) -> KernelResult<()> {
    let index = irq.0 as usize;
    if index >= MAX_IRQS {
        return Err(KernelError::InvalidArgument {
            name: "irq",
            value: "interrupt ID exceeds GIC range",
        });
    }

    let mut table = IRQ_TABLE.lock();
    if table.handlers[index].is_some() {
        return Err(KernelError::AlreadyExists {
            resource: "IRQ handler",
            id: irq.0 as u64,
        });
    }
    table.handlers[index] = Some(handler);
    Ok(())
}

/// Remove the handler for the given interrupt ID.
pub fn unregister_handler(irq: IrqNumber) -> KernelResult<()> {
    let index = irq.0 as usize;
    if index >= MAX_IRQS {
        return Err(KernelError::InvalidArgument {
            name: "irq",
            value: "interrupt ID exceeds GIC range",
        });
    }

    let mut table = IRQ_TABLE.lock();
    if table.handlers[index].take().is_none() {
        return Err(KernelError::NotFound {
            resource: "IRQ handler",
        });
    }
    Ok(())
}

/// Dispatch an acknowledged interrupt to its handler.
///
/// Called from the IRQ exception path between acknowledge and EOI. An
/// interrupt with no registered handler is logged and dropped.
pub fn dispatch(irq: IrqNumber) {
    let handler = {
        let mut table = IRQ_TABLE.lock();
        table.dispatched += 1;
        let index = irq.0 as usize;
        let handler = if index < MAX_IRQS {
            table.handlers[index]
        } else {
            None
        };
        if handler.is_none() {
            table.unhandled += 1;
        }
        handler
    };

    // The lock is released before the handler runs so a handler may
    // consult the registry itself.
    match handler {
        Some(f) => f(irq),
        None => log::warn!("{}: no handler registered, dropped", irq),
    }
}

/// Number of interrupts dispatched since boot.
pub fn dispatch_count() -> u64 {
    IRQ_TABLE.lock().dispatched
}

/// Number of dispatched interrupts that had no handler.
pub fn unhandled_count() -> u64 {
    IRQ_TABLE.lock().unhandled
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use core::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    static FIRED: AtomicU32 = AtomicU32::new(0);

    fn test_handler(_irq: IrqNumber) {
        FIRED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn register_dispatch_unregister() {
        // Use an ID no other test touches; the table is process-global.
        let irq = IrqNumber::new(900);
        let before = dispatch_count();

        register_handler(irq, test_handler).unwrap();
        assert_eq!(
            register_handler(irq, test_handler),
            Err(KernelError::AlreadyExists {
                resource: "IRQ handler",
                id: 900,
            })
        );

        let fired_before = FIRED.load(Ordering::SeqCst);
        dispatch(irq);
        assert_eq!(FIRED.load(Ordering::SeqCst), fired_before + 1);
        assert!(dispatch_count() > before);

        unregister_handler(irq).unwrap();
        assert!(unregister_handler(irq).is_err());
    }

    #[test]
    fn unregistered_irq_is_counted_not_fatal() {
        let missing = IrqNumber::new(901);
        let unhandled_before = unhandled_count();
        dispatch(missing);
        assert_eq!(unhandled_count(), unhandled_before + 1);
    }

    #[test]
    fn out_of_range_rejected() {
        let r = register_handler(IrqNumber::new(MAX_IRQS as u32), test_handler);
        assert!(matches!(r, Err(KernelError::InvalidArgument { .. })));
    }
}
