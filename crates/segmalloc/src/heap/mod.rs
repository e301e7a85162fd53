pub mod arena;
pub mod block;
pub mod free_list;
pub mod size_class;

pub use arena::{Arena, Offset};
pub use block::{Block, PrevHint};
pub use free_list::FreeLists;

use crate::util::{DSIZE, WSIZE};
use block::{ALLOC, HINT_MASK, PFIXED, SIZE_MASK, SZCLASS};
use core::fmt;
use core::ptr;
use size_class::NUM_FIXED_CLASSES;

/// The heap: the arena, the two sentinel headers bracketing the usable
/// range, and the segregated free-list index.
///
/// `Heap` owns the mechanism: block layout, physical walking, the
/// non-local `mark` bookkeeping, and arena growth. Placement policy
/// (which block to hand out, when to split or coalesce) lives in the
/// allocator on top.
pub struct Heap {
    arena: Arena,
    lists: FreeLists,
    prolog: *mut u8,
    epilog: *mut u8,
}

impl Heap {
    pub const fn new() -> Self {
        Heap {
            arena: Arena::new(),
            lists: FreeLists::new(),
            prolog: ptr::null_mut(),
            epilog: ptr::null_mut(),
        }
    }

    /// Arm the heap: reserve the arena and install the sentinels in its
    /// first 16 bytes. Re-initializing resets the free lists and the
    /// break; prior payloads are invalidated.
    ///
    /// # Safety
    /// Must not be called while payloads from a previous init are still
    /// in use.
    pub unsafe fn init(&mut self, limit: usize) -> bool {
        if !self.arena.reserve(limit) {
            return false;
        }
        self.lists.clear();
        let raw = self.arena.extend(4 * WSIZE);
        if raw.is_null() {
            return false;
        }
        let words = raw as *mut u32;
        words.write(0); // alignment pad; keeps offset 0 free to mean null
        words.add(1).write(ALLOC); // prolog header, size 0
        words.add(2).write(ALLOC); // prolog footer
        words.add(3).write(ALLOC); // epilog header, size 0
        self.prolog = raw.add(WSIZE);
        self.epilog = raw.add(3 * WSIZE);
        true
    }

    #[inline(always)]
    pub fn prolog(&self) -> Block {
        Block::from_header(self.prolog)
    }

    #[inline(always)]
    pub fn epilog(&self) -> Block {
        Block::from_header(self.epilog)
    }

    #[inline(always)]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    #[inline(always)]
    pub fn lists(&self) -> &FreeLists {
        &self.lists
    }

    /// Current total heap size in bytes.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.arena.size()
    }

    /// The next physically adjacent block.
    ///
    /// # Safety
    /// `b` must be a live block other than the epilog.
    #[inline]
    pub unsafe fn block_next(&self, b: Block) -> Block {
        debug_assert!(b != self.epilog());
        Block::from_header(b.header_addr().add(b.size() + DSIZE))
    }

    /// The previous physically adjacent block, located through either
    /// the predecessor's footer or this header's fixed-class hint bits.
    ///
    /// # Safety
    /// `b` must be a live block other than the prolog.
    #[inline]
    pub unsafe fn block_prev(&self, b: Block) -> Block {
        debug_assert!(b != self.prolog());
        let header = b.header_addr();
        match b.prev_hint() {
            PrevHint::Fixed16 => Block::from_header(header.sub(16)),
            PrevHint::Fixed24 => Block::from_header(header.sub(24)),
            PrevHint::Footer => {
                let footer = (header.sub(WSIZE) as *const u32).read();
                Block::from_header(header.sub((footer & SIZE_MASK) as usize + DSIZE))
            }
        }
    }

    /// Publish `b`'s bookkeeping after its header has been set: write
    /// the mirrored footer, or, for the footer-less classes, encode the
    /// stride into the successor's hint bits instead. Must run after
    /// every header mutation, with the size already final.
    ///
    /// # Safety
    /// `b` must be a live block other than the epilog, with a valid
    /// header.
    pub unsafe fn mark(&mut self, b: Block) {
        let class = b.class();
        let next = self.block_next(b);
        if class < NUM_FIXED_CLASSES {
            let head = if class == 1 {
                next.header() | SZCLASS
            } else {
                next.header() & !SZCLASS
            };
            next.set_header(head | PFIXED);
        } else {
            b.footer_addr().write(b.header());
            next.set_header(next.header() & !HINT_MASK);
        }
    }

    /// Extend the arena by one block of `size` payload bytes. The old
    /// epilog header is overwritten as the new block's header (keeping
    /// its ALLOC and hint bits) and a fresh epilog is stamped at the new
    /// top. Returns the new block's payload, or null on exhaustion.
    ///
    /// # Safety
    /// The heap must be initialized and `size` a positive multiple of 8.
    pub unsafe fn grow(&mut self, size: usize) -> *mut u8 {
        let raw = self.arena.extend(size + DSIZE);
        if raw.is_null() {
            return ptr::null_mut();
        }
        let b = Block::from_header(raw.sub(WSIZE));
        debug_assert!(b == Block::from_header(self.epilog));
        b.set_header(size as u32 | (b.header() & block::META_MASK));
        self.epilog = self.arena.hi().sub(WSIZE - 1);
        Block::from_header(self.epilog).set_header(ALLOC);
        self.mark(b);
        b.payload()
    }

    /// Insert `b` into the free list for its class.
    ///
    /// # Safety
    /// `b` must be a free block not currently on any list.
    #[inline]
    pub unsafe fn add(&mut self, b: Block) {
        let class = b.class();
        self.lists.insert(&self.arena, b, class);
    }

    /// Unlink `b` from the free list for its class.
    ///
    /// # Safety
    /// `b` must currently be on the list for its class.
    #[inline]
    pub unsafe fn remove(&mut self, b: Block) {
        let class = b.class();
        self.lists.remove(&self.arena, b, class);
    }

    /// Number of free blocks in the heap (forward walk).
    pub fn free_block_count(&self) -> usize {
        let mut count = 0;
        unsafe {
            let mut b = self.prolog();
            while b != self.epilog() {
                if b.is_free() {
                    count += 1;
                }
                b = self.block_next(b);
            }
        }
        count
    }

    /// Payload size of the largest free block, or 0 if none.
    pub fn largest_free_payload(&self) -> usize {
        let mut largest = 0;
        unsafe {
            let mut b = self.prolog();
            while b != self.epilog() {
                if b.is_free() && b.size() > largest {
                    largest = b.size();
                }
                b = self.block_next(b);
            }
        }
        largest
    }
}

impl fmt::Debug for Heap {
    /// Dump every block as `offset[size a|f]`, prolog through epilog.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prolog.is_null() {
            return write!(f, "<uninitialized heap>");
        }
        unsafe {
            let mut b = self.prolog();
            loop {
                write!(
                    f,
                    "{}[{} {}]",
                    self.arena.to_off(b.header_addr()).raw(),
                    b.size(),
                    if b.is_free() { 'f' } else { 'a' }
                )?;
                if b == self.epilog() {
                    break;
                }
                b = self.block_next(b);
            }
        }
        Ok(())
    }
}
