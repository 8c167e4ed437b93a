//! Synchronization primitives for single-core kernel state.

pub mod once_lock;
