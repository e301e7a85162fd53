use crate::platform;
use crate::util::align_up;
use core::ptr;

/// A 32-bit offset from the arena base. Used for every pointer stored
/// inside the heap, halving link overhead on 64-bit targets and capping
/// the arena at 2^32 bytes.
///
/// Offset 0 means null: the first four bytes of the arena are an
/// alignment pad, so no live block header ever sits at offset 0.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct Offset(u32);

impl Offset {
    pub const NULL: Offset = Offset(0);

    #[inline(always)]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// The heap arena: a single contiguous byte range that only ever grows.
///
/// The full address range up to the configured limit is reserved once
/// (inaccessible, costing no memory), and pages are committed as
/// `extend` moves the break upward. This mirrors a classic `sbrk` heap
/// while staying within one mmap reservation, which is what keeps every
/// intra-heap pointer expressible as a 32-bit [`Offset`].
pub struct Arena {
    base: *mut u8,
    reserved: usize,
    committed: usize,
    brk: usize,
    page: usize,
}

impl Arena {
    pub const fn new() -> Self {
        Arena {
            base: ptr::null_mut(),
            reserved: 0,
            committed: 0,
            brk: 0,
            page: 0,
        }
    }

    /// Reserve address space for an arena of at most `limit` bytes.
    /// Re-reserving an arena that already holds a large enough mapping
    /// resets the break instead; prior payloads are invalidated.
    ///
    /// # Safety
    /// Must not be called while blocks handed out from this arena are
    /// still in use.
    pub unsafe fn reserve(&mut self, limit: usize) -> bool {
        if !self.base.is_null() {
            if self.reserved >= limit {
                self.brk = 0;
                return true;
            }
            platform::release(self.base, self.reserved);
            self.base = ptr::null_mut();
        }
        self.page = platform::page_size();
        let reserved = align_up(limit, self.page);
        let base = platform::reserve(reserved);
        if base.is_null() {
            return false;
        }
        self.base = base;
        self.reserved = reserved;
        self.committed = 0;
        self.brk = 0;
        true
    }

    /// Grow the arena by `n` bytes, committing pages as needed.
    /// Returns the address of the first new byte, or null if the
    /// reservation is exhausted or the commit fails.
    ///
    /// # Safety
    /// The arena must have been reserved.
    pub unsafe fn extend(&mut self, n: usize) -> *mut u8 {
        let new_brk = match self.brk.checked_add(n) {
            Some(b) if b <= self.reserved => b,
            _ => return ptr::null_mut(),
        };
        let needed = align_up(new_brk, self.page);
        if needed > self.committed {
            let at = self.base.add(self.committed);
            if !platform::commit(at, needed - self.committed) {
                return ptr::null_mut();
            }
            self.committed = needed;
        }
        let old = self.base.add(self.brk);
        self.brk = new_brk;
        old
    }

    /// Base address of the arena (lower bound).
    #[inline(always)]
    pub fn lo(&self) -> *mut u8 {
        self.base
    }

    /// Current inclusive upper bound of the arena.
    #[inline(always)]
    pub fn hi(&self) -> *mut u8 {
        debug_assert!(self.brk > 0);
        unsafe { self.base.add(self.brk - 1) }
    }

    /// Current arena size in bytes.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.brk
    }

    /// Whether `p` points into the live arena range.
    #[inline(always)]
    pub fn contains(&self, p: *const u8) -> bool {
        !self.base.is_null() && p >= self.base as *const u8 && p <= self.hi() as *const u8
    }

    /// Encode an in-arena address as an offset from the base.
    #[inline(always)]
    pub fn to_off(&self, addr: *const u8) -> Offset {
        debug_assert!(self.contains(addr));
        Offset((addr as usize - self.base as usize) as u32)
    }

    /// Decode an offset back into an address. `off` must be non-null
    /// and produced by `to_off` on this arena.
    #[inline(always)]
    pub unsafe fn to_addr(&self, off: Offset) -> *mut u8 {
        debug_assert!(!off.is_null());
        self.base.add(off.0 as usize)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if !self.base.is_null() {
            unsafe { platform::release(self.base, self.reserved) };
        }
    }
}
