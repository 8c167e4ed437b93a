//! Physical page allocator.
//!
//! Manages RAM as fixed 4 KiB frames. Per-frame metadata lives in a flat
//! array placed at the first 16-byte-aligned address after the kernel
//! image; free frames form a doubly-linked list threaded through that
//! array by index. Allocation pops the head and frees push it, so the
//! allocator is LIFO: `free_frame(f)` followed by `alloc_frame()` hands
//! back `f`.
//!
//! Frames are zeroed on allocation, not on free.

use core::ptr;

use bitflags::bitflags;
use spin::Mutex;

use crate::error::{KernelError, KernelResult};

/// Size of a physical frame (4 KiB).
pub const FRAME_SIZE: usize = 4096;

/// Sentinel index for "no frame" in the free-list links.
const NO_FRAME: u32 = u32::MAX;

bitflags! {
    /// Per-frame state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u32 {
        /// Frame is handed out (or permanently reserved).
        const ALLOCATED = 1 << 0;
        /// Frame belongs to the kernel (image, metadata, heap, or a
        /// kernel allocation); never eligible for the free list while set.
        const KERNEL = 1 << 1;
    }
}

/// Physical memory address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(pub u64);

impl PhysicalAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Per-frame metadata entry.
///
/// `prev`/`next` are indices into the metadata array (valid only while
/// the frame is on the free list); the identity-mapped virtual address is
/// recorded because the kernel runs without page tables of its own.
#[repr(C)]
struct FrameInfo {
    identity_vaddr: u64,
    flags: FrameFlags,
    prev: u32,
    next: u32,
}

/// Span reserved for the kernel heap during [`PageAllocator::init`].
#[derive(Debug, Clone, Copy)]
pub struct HeapRegion {
    pub base: PhysicalAddress,
    pub size: usize,
}

/// Frame accounting snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub total: usize,
    pub free: usize,
    pub kernel: usize,
    pub allocated: usize,
}

/// Free-list physical frame allocator over one contiguous RAM region.
pub struct PageAllocator {
    /// Metadata array base; null until `init` runs.
    frames: *mut FrameInfo,
    total_frames: usize,
    /// Physical address of frame index 0.
    region_base: usize,
    free_head: u32,
    free_count: usize,
}

// SAFETY: PageAllocator owns the metadata array and the frames it manages
// exclusively; all access goes through the enclosing Mutex, so the raw
// pointer is never used concurrently.
unsafe impl Send for PageAllocator {}

impl PageAllocator {
    /// An allocator with no memory attached; `init` must run before use.
    pub const fn empty() -> Self {
        Self {
            frames: ptr::null_mut(),
            total_frames: 0,
            region_base: 0,
            free_head: NO_FRAME,
            free_count: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        !self.frames.is_null()
    }

    /// Attach the allocator to `[region_base, memory_end)`.
    ///
    /// Writes the metadata array at the first 16-byte-aligned address
    /// after `kernel_end`, marks every frame up to the end of the
    /// metadata as kernel-reserved, reserves `heap_frames` contiguous
    /// frames for the kernel heap, and threads the remaining frames onto
    /// the free list in ascending order. Returns the heap span.
    ///
    /// # Safety
    ///
    /// `[region_base, memory_end)` must be RAM that is identity-mapped,
    /// exclusively owned by the caller, and unused except for the kernel
    /// image ending at `kernel_end`. `init` must be called at most once
    /// per allocator.
    pub unsafe fn init(
        &mut self,
        region_base: usize,
        kernel_end: usize,
        memory_end: usize,
        heap_frames: usize,
    ) -> KernelResult<HeapRegion> {
        if region_base % FRAME_SIZE != 0 {
            return Err(KernelError::InvalidArgument {
                name: "region_base",
                value: "not frame aligned",
            });
        }
        if kernel_end < region_base || memory_end <= kernel_end {
            return Err(KernelError::InvalidArgument {
                name: "memory_end",
                value: "region does not contain the kernel image",
            });
        }

        let total_frames = (memory_end - region_base) / FRAME_SIZE;
        let meta_base = align_up(kernel_end, 16);
        let meta_bytes = total_frames * core::mem::size_of::<FrameInfo>();
        let reserved_end = align_up(meta_base + meta_bytes, FRAME_SIZE);

        let heap_base = reserved_end;
        let heap_end = heap_base + heap_frames * FRAME_SIZE;
        if heap_end >= memory_end {
            return Err(KernelError::InvalidArgument {
                name: "heap_frames",
                value: "heap reservation exceeds usable memory",
            });
        }

        self.frames = meta_base as *mut FrameInfo;
        self.total_frames = total_frames;
        self.region_base = region_base;
        self.free_head = NO_FRAME;
        self.free_count = 0;

        let reserved_frames = (reserved_end - region_base) / FRAME_SIZE;
        let heap_first = reserved_frames;
        let heap_last = heap_first + heap_frames;

        for index in 0..total_frames {
            let flags = if index < heap_last {
                FrameFlags::ALLOCATED | FrameFlags::KERNEL
            } else {
                FrameFlags::empty()
            };
            // SAFETY: `index < total_frames` and the metadata array spans
            // exactly `total_frames` entries inside memory the caller
            // guaranteed is exclusively ours.
            unsafe {
                self.frames.add(index).write(FrameInfo {
                    identity_vaddr: (region_base + index * FRAME_SIZE) as u64,
                    flags,
                    prev: NO_FRAME,
                    next: NO_FRAME,
                });
            }
        }

        // Thread the free frames in insertion order: walk backwards and
        // push each onto the head so the list ends up ascending.
        for index in (heap_last..total_frames).rev() {
            self.push_free(index as u32);
        }

        Ok(HeapRegion {
            base: PhysicalAddress::new(heap_base as u64),
            size: heap_frames * FRAME_SIZE,
        })
    }

    fn info(&self, index: u32) -> &FrameInfo {
        debug_assert!((index as usize) < self.total_frames);
        // SAFETY: callers pass indices below total_frames; the metadata
        // array outlives the allocator and is only touched under the
        // enclosing lock.
        unsafe { &*self.frames.add(index as usize) }
    }

    fn info_mut(&mut self, index: u32) -> &mut FrameInfo {
        debug_assert!((index as usize) < self.total_frames);
        // SAFETY: as in `info`; &mut self guarantees exclusive access.
        unsafe { &mut *self.frames.add(index as usize) }
    }

    fn frame_address(&self, index: u32) -> usize {
        self.region_base + index as usize * FRAME_SIZE
    }

    fn index_of(&self, addr: PhysicalAddress) -> Option<u32> {
        let addr = addr.as_usize();
        if addr < self.region_base || addr % FRAME_SIZE != 0 {
            return None;
        }
        let index = (addr - self.region_base) / FRAME_SIZE;
        if index >= self.total_frames {
            return None;
        }
        Some(index as u32)
    }

    fn push_free(&mut self, index: u32) {
        let old_head = self.free_head;
        {
            let info = self.info_mut(index);
            info.prev = NO_FRAME;
            info.next = old_head;
        }
        if old_head != NO_FRAME {
            self.info_mut(old_head).prev = index;
        }
        self.free_head = index;
        self.free_count += 1;
    }

    /// Detach an arbitrary frame from the free list.
    fn unlink_free(&mut self, index: u32) {
        let (prev, next) = {
            let info = self.info(index);
            (info.prev, info.next)
        };
        if prev != NO_FRAME {
            self.info_mut(prev).next = next;
        } else {
            self.free_head = next;
        }
        if next != NO_FRAME {
            self.info_mut(next).prev = prev;
        }
        {
            let info = self.info_mut(index);
            info.prev = NO_FRAME;
            info.next = NO_FRAME;
        }
        self.free_count -= 1;
    }

    fn claim(&mut self, index: u32) {
        self.unlink_free(index);
        self.info_mut(index).flags = FrameFlags::ALLOCATED | FrameFlags::KERNEL;
        let addr = self.frame_address(index);
        // SAFETY: the frame is inside the managed region and was just
        // taken off the free list, so nothing else references it. Zeroing
        // on allocation keeps stale data from leaking between users.
        unsafe {
            ptr::write_bytes(addr as *mut u8, 0, FRAME_SIZE);
        }
    }

    /// Allocate one zeroed frame.
    pub fn alloc_frame(&mut self) -> KernelResult<PhysicalAddress> {
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized {
                subsystem: "page allocator",
            });
        }
        let head = self.free_head;
        if head == NO_FRAME {
            return Err(KernelError::OutOfMemory {
                requested: FRAME_SIZE,
                available: 0,
            });
        }
        self.claim(head);
        Ok(PhysicalAddress::new(self.frame_address(head) as u64))
    }

    /// Allocate `count` physically contiguous zeroed frames.
    ///
    /// Used for buffers a device consumes as one span (the ramfb pixel
    /// buffer). First-fit scan over the metadata array.
    pub fn alloc_frames(&mut self, count: usize) -> KernelResult<PhysicalAddress> {
        if count == 0 {
            return Err(KernelError::InvalidArgument {
                name: "count",
                value: "zero frames requested",
            });
        }
        if count == 1 {
            return self.alloc_frame();
        }
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized {
                subsystem: "page allocator",
            });
        }

        let mut run_start = 0usize;
        let mut run_len = 0usize;
        for index in 0..self.total_frames {
            if self.info(index as u32).flags.is_empty() {
                if run_len == 0 {
                    run_start = index;
                }
                run_len += 1;
                if run_len == count {
                    for i in run_start..run_start + count {
                        self.claim(i as u32);
                    }
                    return Ok(PhysicalAddress::new(
                        self.frame_address(run_start as u32) as u64
                    ));
                }
            } else {
                run_len = 0;
            }
        }

        Err(KernelError::OutOfMemory {
            requested: count * FRAME_SIZE,
            available: self.free_count * FRAME_SIZE,
        })
    }

    /// Return a frame to the free list.
    pub fn free_frame(&mut self, addr: PhysicalAddress) -> KernelResult<()> {
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized {
                subsystem: "page allocator",
            });
        }
        let index = self.index_of(addr).ok_or(KernelError::InvalidArgument {
            name: "addr",
            value: "not a managed frame address",
        })?;

        let flags = self.info(index).flags;
        if !flags.contains(FrameFlags::ALLOCATED) {
            return Err(KernelError::InvalidArgument {
                name: "addr",
                value: "frame is not allocated",
            });
        }

        self.info_mut(index).flags = FrameFlags::empty();
        self.push_free(index);
        Ok(())
    }

    /// Walk the metadata and count frame states.
    pub fn stats(&self) -> FrameStats {
        let mut stats = FrameStats {
            total: self.total_frames,
            free: 0,
            kernel: 0,
            allocated: 0,
        };
        for index in 0..self.total_frames {
            let flags = self.info(index as u32).flags;
            if flags.is_empty() {
                stats.free += 1;
            } else if flags.contains(FrameFlags::KERNEL) {
                stats.kernel += 1;
            } else {
                stats.allocated += 1;
            }
        }
        stats
    }

    /// Verify the free list is acyclic, bidirectionally consistent, and
    /// agrees with the flag bits. Debug/test aid.
    pub fn check_free_list(&self) -> bool {
        let mut seen = 0usize;
        let mut prev = NO_FRAME;
        let mut cursor = self.free_head;
        while cursor != NO_FRAME {
            if seen > self.total_frames {
                return false; // cycle
            }
            let info = self.info(cursor);
            if info.prev != prev || !info.flags.is_empty() {
                return false;
            }
            seen += 1;
            prev = cursor;
            cursor = info.next;
        }
        seen == self.free_count
    }
}

// ---------------------------------------------------------------------------
// Global instance
// ---------------------------------------------------------------------------

static PAGE_ALLOCATOR: Mutex<PageAllocator> = Mutex::new(PageAllocator::empty());

/// Initialize the global page allocator. See [`PageAllocator::init`].
///
/// # Safety
///
/// Same contract as [`PageAllocator::init`]; must be called once during
/// early boot before any allocation.
pub unsafe fn init(
    region_base: usize,
    kernel_end: usize,
    memory_end: usize,
    heap_frames: usize,
) -> KernelResult<HeapRegion> {
    let mut allocator = PAGE_ALLOCATOR.lock();
    if allocator.is_initialized() {
        return Err(KernelError::AlreadyExists {
            resource: "page allocator",
            id: 0,
        });
    }
    // SAFETY: contract forwarded to the caller.
    unsafe { allocator.init(region_base, kernel_end, memory_end, heap_frames) }
}

/// Allocate one zeroed frame from the global allocator.
pub fn alloc_frame() -> KernelResult<PhysicalAddress> {
    PAGE_ALLOCATOR.lock().alloc_frame()
}

/// Allocate physically contiguous zeroed frames from the global allocator.
pub fn alloc_frames(count: usize) -> KernelResult<PhysicalAddress> {
    PAGE_ALLOCATOR.lock().alloc_frames(count)
}

/// Return a frame to the global allocator.
pub fn free_frame(addr: PhysicalAddress) -> KernelResult<()> {
    PAGE_ALLOCATOR.lock().free_frame(addr)
}

/// Frame accounting for the global allocator.
pub fn stats() -> FrameStats {
    PAGE_ALLOCATOR.lock().stats()
}

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use std::alloc::{alloc, dealloc, Layout};

    use super::*;

    /// A frame-aligned scratch region standing in for RAM.
    struct Playground {
        base: *mut u8,
        layout: Layout,
        allocator: PageAllocator,
    }

    const PLAY_FRAMES: usize = 64;

    impl Playground {
        fn new() -> Self {
            let layout = Layout::from_size_align(PLAY_FRAMES * FRAME_SIZE, FRAME_SIZE).unwrap();
            // SAFETY: layout has non-zero size.
            let base = unsafe { alloc(layout) };
            assert!(!base.is_null());

            let region_base = base as usize;
            // Pretend the first two frames hold the kernel image.
            let kernel_end = region_base + 2 * FRAME_SIZE;
            let memory_end = region_base + PLAY_FRAMES * FRAME_SIZE;

            let mut allocator = PageAllocator::empty();
            // SAFETY: the region is a live exclusive allocation of ours.
            unsafe {
                allocator
                    .init(region_base, kernel_end, memory_end, 4)
                    .unwrap();
            }
            Self {
                base,
                layout,
                allocator,
            }
        }
    }

    impl Drop for Playground {
        fn drop(&mut self) {
            // SAFETY: base/layout come from the alloc in `new`.
            unsafe { dealloc(self.base, self.layout) };
        }
    }

    #[test]
    fn accounting_adds_up() {
        let play = Playground::new();
        let stats = play.allocator.stats();
        assert_eq!(stats.total, PLAY_FRAMES);
        assert_eq!(stats.free + stats.kernel + stats.allocated, stats.total);
        // Metadata for 64 frames fits inside frame 2, so frames 0..3 are
        // kernel plus the 4 heap frames.
        assert_eq!(stats.kernel, 3 + 4);
        assert!(play.allocator.check_free_list());
    }

    #[test]
    fn alloc_free_is_lifo() {
        let mut play = Playground::new();
        let p = play.allocator.alloc_frame().unwrap();
        let q = play.allocator.alloc_frame().unwrap();
        assert_ne!(p, q);

        play.allocator.free_frame(p).unwrap();
        let r = play.allocator.alloc_frame().unwrap();
        assert_eq!(r, p);
        assert!(play.allocator.check_free_list());
    }

    #[test]
    fn frames_are_zeroed_on_alloc() {
        let mut play = Playground::new();
        let p = play.allocator.alloc_frame().unwrap();

        // Dirty the frame while it is ours, free it, and take it back
        // (LIFO guarantees we get the same frame).
        // SAFETY: p is a frame we own inside the playground region.
        unsafe { ptr::write_bytes(p.as_usize() as *mut u8, 0xAB, FRAME_SIZE) };
        play.allocator.free_frame(p).unwrap();
        let again = play.allocator.alloc_frame().unwrap();
        assert_eq!(again, p);

        // SAFETY: reading a frame we own.
        let slice =
            unsafe { core::slice::from_raw_parts(again.as_usize() as *const u8, FRAME_SIZE) };
        assert!(slice.iter().all(|&b| b == 0));
    }

    #[test]
    fn exhaustion_reports_out_of_memory() {
        let mut play = Playground::new();
        let free = play.allocator.stats().free;
        for _ in 0..free {
            play.allocator.alloc_frame().unwrap();
        }
        assert!(matches!(
            play.allocator.alloc_frame(),
            Err(KernelError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn free_rejects_bad_addresses() {
        let mut play = Playground::new();
        let p = play.allocator.alloc_frame().unwrap();
        play.allocator.free_frame(p).unwrap();

        // Double free.
        assert!(matches!(
            play.allocator.free_frame(p),
            Err(KernelError::InvalidArgument { .. })
        ));
        // Unaligned.
        assert!(play
            .allocator
            .free_frame(PhysicalAddress::new(p.as_u64() + 1))
            .is_err());
        // Outside the region.
        assert!(play
            .allocator
            .free_frame(PhysicalAddress::new(0x10))
            .is_err());
    }

    #[test]
    fn contiguous_allocation() {
        let mut play = Playground::new();
        let span = play.allocator.alloc_frames(8).unwrap();
        // All eight frames must be consecutive and now allocated.
        for i in 0..8 {
            let addr = PhysicalAddress::new(span.as_u64() + (i * FRAME_SIZE) as u64);
            let index = play.allocator.index_of(addr).unwrap();
            assert!(play
                .allocator
                .info(index)
                .flags
                .contains(FrameFlags::ALLOCATED));
        }
        assert!(play.allocator.check_free_list());

        // Freeing the middle and re-requesting a large span still works
        // around the hole.
        play.allocator
            .free_frame(PhysicalAddress::new(span.as_u64() + 4 * FRAME_SIZE as u64))
            .unwrap();
        let other = play.allocator.alloc_frames(8).unwrap();
        assert_ne!(other, span);
        assert!(play.allocator.check_free_list());
    }

    #[test]
    fn zero_count_rejected() {
        let mut play = Playground::new();
        assert!(matches!(
            play.allocator.alloc_frames(0),
            Err(KernelError::InvalidArgument { .. })
        ));
    }
}
