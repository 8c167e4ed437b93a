//! Volatile MMIO accessors and memory barriers.
//!
//! Every device register access in the kernel funnels through these
//! wrappers so the volatile discipline (no elision, no reordering by the
//! compiler) lives in one place. Ordering against the device itself is
//! the caller's job via [`dsb_sy`].

/// Read an 8-bit device register.
///
/// # Safety
///
/// `addr` must be a valid MMIO register address for the current platform
/// and reading it must be free of unacceptable side effects.
#[inline]
pub unsafe fn read8(addr: usize) -> u8 {
    // SAFETY: caller guarantees addr is a live MMIO register.
    unsafe { (addr as *const u8).read_volatile() }
}

/// Write an 8-bit device register.
///
/// # Safety
///
/// `addr` must be a valid, writable MMIO register address.
#[inline]
pub unsafe fn write8(addr: usize, value: u8) {
    // SAFETY: caller guarantees addr is a live MMIO register.
    unsafe { (addr as *mut u8).write_volatile(value) }
}

/// Read a 16-bit device register.
///
/// # Safety
///
/// `addr` must be a valid, 2-byte-aligned MMIO register address.
#[inline]
pub unsafe fn read16(addr: usize) -> u16 {
    // SAFETY: caller guarantees addr is a live, aligned MMIO register.
    unsafe { (addr as *const u16).read_volatile() }
}

/// Write a 16-bit device register.
///
/// # Safety
///
/// `addr` must be a valid, writable, 2-byte-aligned MMIO register address.
#[inline]
pub unsafe fn write16(addr: usize, value: u16) {
    // SAFETY: caller guarantees addr is a live, aligned MMIO register.
    unsafe { (addr as *mut u16).write_volatile(value) }
}

/// Read a 32-bit device register.
///
/// # Safety
///
/// `addr` must be a valid, 4-byte-aligned MMIO register address.
#[inline]
pub unsafe fn read32(addr: usize) -> u32 {
    // SAFETY: caller guarantees addr is a live, aligned MMIO register.
    unsafe { (addr as *const u32).read_volatile() }
}

/// Write a 32-bit device register.
///
/// # Safety
///
/// `addr` must be a valid, writable, 4-byte-aligned MMIO register address.
#[inline]
pub unsafe fn write32(addr: usize, value: u32) {
    // SAFETY: caller guarantees addr is a live, aligned MMIO register.
    unsafe { (addr as *mut u32).write_volatile(value) }
}

/// Read a 64-bit device register.
///
/// # Safety
///
/// `addr` must be a valid, 8-byte-aligned MMIO register address.
#[inline]
pub unsafe fn read64(addr: usize) -> u64 {
    // SAFETY: caller guarantees addr is a live, aligned MMIO register.
    unsafe { (addr as *const u64).read_volatile() }
}

/// Write a 64-bit device register.
///
/// # Safety
///
/// `addr` must be a valid, writable, 8-byte-aligned MMIO register address.
#[inline]
pub unsafe fn write64(addr: usize, value: u64) {
    // SAFETY: caller guarantees addr is a live, aligned MMIO register.
    unsafe { (addr as *mut u64).write_volatile(value) }
}

/// Full-system data synchronization barrier.
///
/// Required after handing memory to a device (DMA descriptors, the ramfb
/// record, GIC enables) and before reading fields a device mutates.
#[inline]
pub fn dsb_sy() {
    // SAFETY: DSB SY is a non-destructive architectural barrier, valid at
    // every exception level.
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
    }
}

/// Instruction synchronization barrier.
#[inline]
pub fn isb() {
    // SAFETY: ISB only flushes the pipeline; it has no memory or register
    // side effects.
    unsafe {
        core::arch::asm!("isb", options(nostack, preserves_flags));
    }
}
