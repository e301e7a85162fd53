#[cfg(debug_assertions)]
use crate::check;
use crate::config;
use crate::heap::block::{ALLOC, HINT_MASK, META_MASK};
use crate::heap::size_class::{class_of, BEST_FIT_MIN_CLASS, CATCH_ALL};
use crate::heap::{Block, Heap};
use crate::util::{DEFAULT_HEAP_LIMIT, DEFAULT_LOOKAHEAD, DSIZE};
use core::ptr;

/// Splitting threshold: a fit must exceed the request by at least a
/// header+footer slot plus the minimum payload to be worth carving.
const MIN_SPLIT_SURPLUS: usize = 2 * DSIZE;

/// The placement engine: size normalization, segregated-list search
/// with bounded best-fit, splitting, coalescing, in-place realloc
/// growth, and arena extension as the last resort.
///
/// The engine is single-threaded by design and takes an explicit
/// `&mut self` on every operation; callers that need concurrent access
/// wrap it in external mutual exclusion (see `init::with_allocator`).
pub struct SeglistAllocator {
    heap: Heap,
    limit: usize,
    lookahead: usize,
}

impl SeglistAllocator {
    pub const fn new() -> Self {
        SeglistAllocator {
            heap: Heap::new(),
            limit: DEFAULT_HEAP_LIMIT,
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }

    /// Arm the allocator. Must be called before any other operation;
    /// calling it again resets the heap and invalidates prior payloads.
    pub unsafe fn init(&mut self) -> bool {
        self.limit = config::heap_limit();
        self.lookahead = config::lookahead();
        let ok = self.heap.init(self.limit);
        if ok {
            self.debug_check();
        }
        ok
    }

    #[inline(always)]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Allocate at least `size` bytes, 8-aligned. Returns null for
    /// size 0, on arithmetic overflow, and when the arena limit is
    /// reached.
    ///
    /// # Safety
    /// The allocator must be initialized.
    pub unsafe fn malloc(&mut self, size: usize) -> *mut u8 {
        self.debug_check();
        let p = self.malloc_inner(size);
        self.debug_check();
        p
    }

    unsafe fn malloc_inner(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        let size = match size.checked_add(DSIZE - 1) {
            Some(s) => s & !(DSIZE - 1),
            None => return ptr::null_mut(),
        };
        // Fold small requests into the two fixed classes.
        let size = if size <= 12 {
            DSIZE
        } else if size <= 20 {
            2 * DSIZE
        } else {
            size
        };

        let class = class_of(size);
        let p = self.search_list(class, size);
        if !p.is_null() {
            return p;
        }
        // A big enough block may still be waiting on the catch-all list.
        if class != CATCH_ALL {
            let p = self.search_list(CATCH_ALL, size);
            if !p.is_null() {
                return p;
            }
        }
        self.extend_heap(size)
    }

    /// Search one free list for a block that can hold `size` bytes.
    ///
    /// Lists below `BEST_FIT_MIN_CLASS` hold a single uniform size, so
    /// the head is returned without a fit check. Larger lists are
    /// scanned first-fit, then up to `lookahead` further entries may
    /// replace the candidate with a strictly smaller fit. A candidate
    /// whose surplus covers a minimum block is split.
    unsafe fn search_list(&mut self, class: usize, size: usize) -> *mut u8 {
        let start = self.heap.lists().head(class);
        if start.is_null() {
            return ptr::null_mut();
        }
        let arena = self.heap.arena();
        let mut n = Block::from_header(arena.to_addr(start));
        if class < BEST_FIT_MIN_CLASS {
            return self.take(n);
        }
        loop {
            let mut best = n.size();
            if best >= size {
                let mut count = 0;
                let mut m_off = n.next_link();
                while count < self.lookahead && m_off != start {
                    let m = Block::from_header(arena.to_addr(m_off));
                    let sz = m.size();
                    if sz < best && sz >= size {
                        best = sz;
                        n = m;
                    }
                    m_off = m.next_link();
                    count += 1;
                }
                if best - size >= MIN_SPLIT_SURPLUS {
                    return self.carve(n, size, best - size - DSIZE);
                }
                return self.take(n);
            }
            let n_off = n.next_link();
            if n_off == start {
                break;
            }
            n = Block::from_header(arena.to_addr(n_off));
        }
        ptr::null_mut()
    }

    /// Split `n` into an allocated low part of `lo` payload bytes and a
    /// free high part of `hi` payload bytes, reinserting the high part
    /// into its (possibly different) list.
    unsafe fn carve(&mut self, n: Block, lo: usize, hi: usize) -> *mut u8 {
        self.heap.remove(n);
        n.set_header(lo as u32 | (n.header() & HINT_MASK) | ALLOC);
        // Marking the low part first settles the hint bits at the high
        // part's header location before the rest of that word is built.
        self.heap.mark(n);
        let m = self.heap.block_next(n);
        m.set_header(hi as u32 | (m.header() & HINT_MASK));
        self.heap.mark(m);
        self.heap.add(m);
        n.payload()
    }

    /// Hand out the whole of free block `n`.
    unsafe fn take(&mut self, n: Block) -> *mut u8 {
        self.heap.remove(n);
        n.set_header(n.header() | ALLOC);
        self.heap.mark(n);
        n.payload()
    }

    /// Last resort: push the break up by one block. The arena limit is
    /// enforced here, before any state changes.
    unsafe fn extend_heap(&mut self, size: usize) -> *mut u8 {
        match size.checked_add(DSIZE) {
            Some(grown) if grown.saturating_add(self.heap.size()) <= self.limit => {
                self.heap.grow(size)
            }
            _ => ptr::null_mut(),
        }
    }

    /// Free a payload previously returned by this allocator. Null is a
    /// no-op. The block is coalesced with free physical neighbors and
    /// reinserted.
    ///
    /// # Safety
    /// `ptr` must be null or a live payload from this allocator.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        self.debug_check();
        let b = Block::from_payload(ptr);
        b.set_header(b.header() & !ALLOC);
        let next = self.heap.block_next(b);
        let prev = self.heap.block_prev(b);
        if next.is_free() {
            self.heap.remove(next);
            if prev.is_free() {
                self.heap.remove(prev);
                let size = prev.size() + b.size() + next.size() + 2 * DSIZE;
                prev.set_header(size as u32 | (prev.header() & META_MASK));
                self.heap.mark(prev);
                self.heap.add(prev);
            } else {
                let size = b.size() + next.size() + DSIZE;
                b.set_header(size as u32 | (b.header() & HINT_MASK));
                self.heap.mark(b);
                self.heap.add(b);
            }
        } else if prev.is_free() {
            self.heap.remove(prev);
            let size = prev.size() + b.size() + DSIZE;
            prev.set_header(size as u32 | (prev.header() & META_MASK));
            self.heap.mark(prev);
            self.heap.add(prev);
        } else {
            self.heap.add(b);
        }
        self.debug_check();
    }

    /// Resize a payload. Size 0 frees; a null pointer allocates; a
    /// request matching the current payload size is a no-op. Otherwise
    /// the block grows in place by absorbing free neighbors when they
    /// suffice, and relocates as a last resort. Returning null on
    /// exhaustion leaves the old payload intact.
    ///
    /// # Safety
    /// `ptr` must be null or a live payload from this allocator.
    pub unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        if size == 0 {
            self.free(ptr);
            return ptr::null_mut();
        }
        if ptr.is_null() {
            return self.malloc(size);
        }
        self.debug_check();
        let old = Block::from_payload(ptr);
        let size = match size.checked_add(DSIZE - 1) {
            Some(s) => s & !(DSIZE - 1),
            None => return ptr::null_mut(),
        };
        let oldsize = old.size();
        if oldsize == size {
            return ptr;
        }

        let prev = self.heap.block_prev(old);
        let next = self.heap.block_next(old);
        if next.is_free() {
            if prev.is_free() {
                let newsz = prev.size() + oldsize + next.size() + 2 * DSIZE;
                if newsz < size {
                    return self.relocate(ptr, oldsize, size);
                }
                self.heap.remove(prev);
                self.heap.remove(next);
                prev.set_header(newsz as u32 | (prev.header() & HINT_MASK));
            } else {
                let newsz = oldsize + next.size() + DSIZE;
                if newsz < size {
                    return self.relocate(ptr, oldsize, size);
                }
                self.heap.remove(next);
                old.set_header(newsz as u32 | (old.header() & HINT_MASK) | ALLOC);
                self.heap.mark(old);
                self.debug_check();
                return ptr;
            }
        } else if prev.is_free() {
            let newsz = prev.size() + oldsize + DSIZE;
            if newsz < size {
                return self.relocate(ptr, oldsize, size);
            }
            self.heap.remove(prev);
            prev.set_header(newsz as u32 | (prev.header() & HINT_MASK));
        } else {
            return self.relocate(ptr, oldsize, size);
        }

        // Absorbed into the predecessor: commit the header, then move
        // the payload down. Source and destination overlap, so this
        // must be a memmove.
        prev.set_header(prev.header() | ALLOC);
        self.heap.mark(prev);
        let newptr = prev.payload();
        ptr::copy(ptr, newptr, oldsize.min(size));
        self.debug_check();
        newptr
    }

    /// Realloc fallback: fresh allocation, disjoint copy, free the old
    /// block. A failed allocation leaves the old payload untouched.
    unsafe fn relocate(&mut self, oldptr: *mut u8, oldsize: usize, size: usize) -> *mut u8 {
        let newptr = self.malloc(size);
        if newptr.is_null() {
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(oldptr, newptr, oldsize.min(size));
        self.free(oldptr);
        newptr
    }

    /// Allocate a zeroed array of `nmemb` elements of `size` bytes.
    /// Overflow of the product returns null.
    ///
    /// # Safety
    /// The allocator must be initialized.
    pub unsafe fn calloc(&mut self, nmemb: usize, size: usize) -> *mut u8 {
        self.debug_check();
        let total = match nmemb.checked_mul(size) {
            Some(t) => t,
            None => return ptr::null_mut(),
        };
        let p = self.malloc(total);
        if !p.is_null() {
            ptr::write_bytes(p, 0, total);
        }
        self.debug_check();
        p
    }

    /// Usable payload bytes behind `ptr`; 0 for null.
    ///
    /// # Safety
    /// `ptr` must be null or a live payload from this allocator.
    pub unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
        if ptr.is_null() {
            return 0;
        }
        Block::from_payload(ptr).size()
    }

    /// Run the consistency checker, aborting on violation. Compiled to
    /// nothing in release builds.
    #[cfg(debug_assertions)]
    fn debug_check(&self) {
        if let Err(err) = unsafe { check::check(&self.heap) } {
            check::fail(err);
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn debug_check(&self) {}
}

impl Default for SeglistAllocator {
    fn default() -> Self {
        Self::new()
    }
}
