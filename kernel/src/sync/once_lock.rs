//! Safe late-initialized global state.
//!
//! Kernel subsystems (GIC, timer, console) come up in a fixed order during
//! boot, so their global instances cannot be built in a `const` context.
//! `GlobalState` wraps `spin::Mutex<Option<T>>` to give them a safe
//! init-once / access-later pattern without `static mut`.

use spin::Mutex;

/// Global state that is populated exactly once during boot and accessed
/// through closures afterwards.
pub struct GlobalState<T> {
    inner: Mutex<Option<T>>,
}

impl<T> GlobalState<T> {
    /// Create new uninitialized global state.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Initialize the global state.
    ///
    /// Returns the value back if the state was already initialized.
    pub fn init(&self, value: T) -> Result<(), T> {
        let mut lock = self.inner.lock();
        if lock.is_some() {
            Err(value)
        } else {
            *lock = Some(value);
            Ok(())
        }
    }

    /// Run a closure with a shared reference to the value, if initialized.
    pub fn with<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R> {
        let lock = self.inner.lock();
        lock.as_ref().map(f)
    }

    /// Run a closure with a mutable reference to the value, if initialized.
    pub fn with_mut<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> Option<R> {
        let mut lock = self.inner.lock();
        lock.as_mut().map(f)
    }

    /// Whether `init` has run.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T> Default for GlobalState<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: GlobalState<T> can be sent across contexts if T: Send. The inner
// spin::Mutex provides mutual exclusion, so the contained Option<T> is only
// accessed by one context at a time.
unsafe impl<T: Send> Send for GlobalState<T> {}
// SAFETY: The spin::Mutex serializes all access to the inner Option<T>,
// preventing data races. T only needs to be Send (not Sync) because each
// caller gets exclusive access through the lock guard.
unsafe impl<T: Send> Sync for GlobalState<T> {}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn init_once_then_access() {
        let state = GlobalState::new();
        assert!(!state.is_initialized());
        assert!(state.with(|v: &u32| *v).is_none());

        assert!(state.init(7u32).is_ok());
        assert_eq!(state.init(9u32), Err(9));

        assert_eq!(state.with(|v| *v), Some(7));
        state.with_mut(|v| *v += 1);
        assert_eq!(state.with(|v| *v), Some(8));
    }
}
