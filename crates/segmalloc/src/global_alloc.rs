//! `#[global_allocator]` support for segmalloc.
//!
//! Allows Rust programs to route their heap through the segregated
//! free-list engine:
//!
//! ```rust,ignore
//! use segmalloc::SegMalloc;
//!
//! #[global_allocator]
//! static GLOBAL: SegMalloc = SegMalloc;
//! ```
//!
//! Alignments above 8 are not supported by the block layout; such
//! requests fail (return null), which the `GlobalAlloc` contract
//! permits. The arena is capped at the configured heap limit.

use crate::init::{self, STATE_READY};
use crate::util::DSIZE;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

/// A zero-sized unit struct that implements [`GlobalAlloc`] by
/// delegating to the global segmalloc instance.
pub struct SegMalloc;

unsafe impl GlobalAlloc for SegMalloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();

        // Zero-size types: return a well-aligned dangling pointer.
        // This is the standard pattern used by the Rust standard library.
        if size == 0 {
            return layout.align() as *mut u8;
        }
        if layout.align() > DSIZE {
            return ptr::null_mut();
        }

        init::ensure_initialized();
        if init::state() != STATE_READY {
            return ptr::null_mut();
        }
        init::with_allocator(|a| a.malloc(size))
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        init::with_allocator(|a| a.free(ptr));
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > DSIZE {
            return ptr::null_mut();
        }
        if layout.size() == 0 {
            return self.alloc(Layout::from_size_align_unchecked(new_size, layout.align()));
        }
        if new_size == 0 {
            self.dealloc(ptr, layout);
            return layout.align() as *mut u8;
        }
        init::with_allocator(|a| a.realloc(ptr, new_size))
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();
        if size == 0 {
            return layout.align() as *mut u8;
        }
        if layout.align() > DSIZE {
            return ptr::null_mut();
        }

        init::ensure_initialized();
        if init::state() != STATE_READY {
            return ptr::null_mut();
        }
        init::with_allocator(|a| a.calloc(1, size))
    }
}
