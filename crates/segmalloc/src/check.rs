//! Debug-build heap consistency checker.
//!
//! One forward pass over the physical block chain cross-verifies the
//! walker in both directions and counts free blocks; a second pass over
//! every free list verifies the circular links and membership and pays
//! the count back down. Any residue means a free block is missing from
//! its list (or listed twice).
//!
//! The engine invokes [`check`] on entry and exit of every public
//! operation in debug builds and aborts through [`fail`] on violation;
//! release builds compile the call sites out.

use crate::heap::size_class::NUM_CLASSES;
use crate::heap::{Block, Heap, Offset};
use crate::util::{is_aligned, DSIZE};

/// A violated heap invariant. Offsets locate the offending block
/// header relative to the arena base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    /// A payload address is not 8-aligned.
    MisalignedPayload { off: u32 },
    /// `block_prev(block_next(b)) != b`.
    BrokenForwardChain { off: u32 },
    /// `block_next(block_prev(b)) != b`.
    BrokenBackwardChain { off: u32 },
    /// Two physically adjacent blocks are both free.
    AdjacentFreeBlocks { off: u32 },
    /// A list link is null; non-empty lists must be fully circular.
    NullListLink { class: usize },
    /// A list link points outside the live arena.
    LinkOutOfHeap { class: usize, off: u32 },
    /// `prev(next(b)) != b` within a free list.
    ListNextMismatch { class: usize, off: u32 },
    /// `next(prev(b)) != b` within a free list.
    ListPrevMismatch { class: usize, off: u32 },
    /// An allocated block is sitting on a free list.
    AllocatedOnFreeList { class: usize, off: u32 },
    /// A free block is on a list that does not match its size class.
    WrongList { class: usize, off: u32 },
    /// Free blocks in the heap and free-list members disagree.
    FreeCountMismatch { delta: isize },
}

/// Verify every structural invariant of the heap.
///
/// # Safety
/// The heap must be initialized. The checker trusts headers enough to
/// walk them; wild corruption of a size field may still crash rather
/// than report.
pub unsafe fn check(heap: &Heap) -> Result<(), CheckError> {
    let arena = heap.arena();
    let mut free_blocks: isize = 0;

    // Forward pass: alignment, bidirectional chaining, no adjacent
    // frees, and the free-block census.
    let mut b = heap.prolog();
    loop {
        let off = arena.to_off(b.header_addr()).raw();
        if !is_aligned(b.payload() as usize, DSIZE) {
            return Err(CheckError::MisalignedPayload { off });
        }
        if b != heap.epilog() {
            let next = heap.block_next(b);
            if heap.block_prev(next) != b {
                return Err(CheckError::BrokenForwardChain { off });
            }
            if b.is_free() && next.is_free() {
                return Err(CheckError::AdjacentFreeBlocks { off });
            }
        }
        if b != heap.prolog() {
            let prev = heap.block_prev(b);
            if heap.block_next(prev) != b {
                return Err(CheckError::BrokenBackwardChain { off });
            }
        }
        if b == heap.epilog() {
            break;
        }
        if b.is_free() {
            free_blocks += 1;
        }
        b = heap.block_next(b);
    }

    // List pass: circular link consistency and membership per class.
    for class in 0..NUM_CLASSES {
        let start = heap.lists().head(class);
        if start.is_null() {
            continue;
        }
        let mut n_off = start;
        loop {
            let n = resolve(heap, class, n_off)?;
            let off = n_off.raw();
            let next_off = n.next_link();
            let prev_off = n.prev_link();
            let next = resolve(heap, class, next_off)?;
            let prev = resolve(heap, class, prev_off)?;
            if next.prev_link() != n_off {
                return Err(CheckError::ListNextMismatch { class, off });
            }
            if prev.next_link() != n_off {
                return Err(CheckError::ListPrevMismatch { class, off });
            }
            if !n.is_free() {
                return Err(CheckError::AllocatedOnFreeList { class, off });
            }
            if n.class() != class {
                return Err(CheckError::WrongList { class, off });
            }
            free_blocks -= 1;
            n_off = next_off;
            if n_off == start {
                break;
            }
        }
    }

    if free_blocks != 0 {
        return Err(CheckError::FreeCountMismatch { delta: free_blocks });
    }
    Ok(())
}

/// Turn a stored list offset into a block, validating it first.
unsafe fn resolve(heap: &Heap, class: usize, off: Offset) -> Result<Block, CheckError> {
    if off.is_null() {
        return Err(CheckError::NullListLink { class });
    }
    if off.raw() as usize >= heap.arena().size() {
        return Err(CheckError::LinkOutOfHeap {
            class,
            off: off.raw(),
        });
    }
    Ok(Block::from_header(heap.arena().to_addr(off)))
}

/// Report a violation on stderr and abort. Writes through the raw fd so
/// no allocation happens on the failure path.
#[cold]
#[inline(never)]
pub fn fail(err: CheckError) -> ! {
    let msg: &str = match err {
        CheckError::MisalignedPayload { .. } => "segmalloc: heap check: misaligned payload\n",
        CheckError::BrokenForwardChain { .. } => {
            "segmalloc: heap check: next block's previous block isn't this block\n"
        }
        CheckError::BrokenBackwardChain { .. } => {
            "segmalloc: heap check: previous block's next block isn't this block\n"
        }
        CheckError::AdjacentFreeBlocks { .. } => {
            "segmalloc: heap check: adjacent free blocks escaped coalescing\n"
        }
        CheckError::NullListLink { .. } => "segmalloc: heap check: null link in a free list\n",
        CheckError::LinkOutOfHeap { .. } => {
            "segmalloc: heap check: free-list link points outside the heap\n"
        }
        CheckError::ListNextMismatch { .. } => {
            "segmalloc: heap check: next element's previous element isn't this element\n"
        }
        CheckError::ListPrevMismatch { .. } => {
            "segmalloc: heap check: previous element's next element isn't this element\n"
        }
        CheckError::AllocatedOnFreeList { .. } => {
            "segmalloc: heap check: allocated block on a free list\n"
        }
        CheckError::WrongList { .. } => {
            "segmalloc: heap check: free block filed under the wrong class\n"
        }
        CheckError::FreeCountMismatch { .. } => {
            "segmalloc: heap check: free blocks in heap not on a list\n"
        }
    };
    abort_with_message(msg)
}

/// Write a diagnostic to stderr and abort the process. Used when
/// unrecoverable corruption is detected.
#[cold]
#[inline(never)]
pub fn abort_with_message(msg: &str) -> ! {
    unsafe {
        // Write directly to stderr fd (2) -- no allocation needed
        libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        libc::abort();
    }
}
