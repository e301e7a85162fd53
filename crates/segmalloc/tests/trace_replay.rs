//! Trace-driven replay testing.
//!
//! Generates deterministic pseudo-random op traces and replays them
//! against a private allocator instance, verifying the four-operation
//! contract against a shadow model: every live payload keeps the
//! pattern written when it was created until it is freed or resized.

use segmalloc::check;
use segmalloc::SeglistAllocator;

const MAX_LIVE: usize = 128;

#[derive(Debug, Clone, Copy)]
enum Op {
    Malloc(usize, usize),  // slot, size
    Free(usize),           // slot
    Realloc(usize, usize), // slot, new size
    Calloc(usize, usize),  // slot, size
}

/// Simple seeded PRNG
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Rng(seed)
    }

    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn next_usize(&mut self, max: usize) -> usize {
        (self.next() as usize) % max
    }
}

fn generate_trace(seed: u64, count: usize) -> Vec<Op> {
    let mut rng = Rng::new(seed);
    let mut ops = Vec::with_capacity(count);
    for _ in 0..count {
        let slot = rng.next_usize(MAX_LIVE);
        // Mix of small fixed-class, bucketed, and catch-all sizes.
        let size = match rng.next_usize(4) {
            0 => 1 + rng.next_usize(24),
            1 => 1 + rng.next_usize(128),
            2 => 1 + rng.next_usize(1024),
            _ => 1 + rng.next_usize(4096),
        };
        let op = match rng.next_usize(10) {
            0..=3 => Op::Malloc(slot, size),
            4..=6 => Op::Free(slot),
            7..=8 => Op::Realloc(slot, size),
            _ => Op::Calloc(slot, size),
        };
        ops.push(op);
    }
    ops
}

/// One live allocation in the shadow model.
#[derive(Clone, Copy)]
struct Shadow {
    ptr: *mut u8,
    size: usize,
    fill: u8,
}

fn fill_byte(rng: &mut Rng) -> u8 {
    (rng.next() & 0x7F) as u8 | 0x80 // never zero, distinguishes from calloc
}

unsafe fn verify(s: &Shadow) {
    for i in 0..s.size {
        assert_eq!(
            s.ptr.add(i).read(),
            s.fill,
            "payload {:p} (len {}) corrupted at byte {}",
            s.ptr,
            s.size,
            i
        );
    }
}

fn replay(seed: u64, count: usize) {
    let ops = generate_trace(seed, count);
    let mut a = SeglistAllocator::new();
    unsafe {
        assert!(a.init(), "arena reservation failed");
    }
    let mut slots: Vec<Option<Shadow>> = vec![None; MAX_LIVE];
    let mut rng = Rng::new(seed ^ 0x5eed);

    for (i, op) in ops.iter().enumerate() {
        unsafe {
            match *op {
                Op::Malloc(slot, size) => {
                    if let Some(s) = slots[slot].take() {
                        verify(&s);
                        a.free(s.ptr);
                    }
                    let ptr = a.malloc(size);
                    assert!(!ptr.is_null(), "malloc({}) failed at op {}", size, i);
                    let fill = fill_byte(&mut rng);
                    ptr.write_bytes(fill, size);
                    slots[slot] = Some(Shadow { ptr, size, fill });
                }
                Op::Free(slot) => {
                    if let Some(s) = slots[slot].take() {
                        verify(&s);
                        a.free(s.ptr);
                    }
                }
                Op::Realloc(slot, size) => match slots[slot].take() {
                    Some(s) => {
                        verify(&s);
                        let ptr = a.realloc(s.ptr, size);
                        assert!(!ptr.is_null(), "realloc({}) failed at op {}", size, i);
                        // The old prefix must have survived the move.
                        let kept = s.size.min(size);
                        for j in 0..kept {
                            assert_eq!(
                                ptr.add(j).read(),
                                s.fill,
                                "realloc lost byte {} at op {}",
                                j,
                                i
                            );
                        }
                        let fill = fill_byte(&mut rng);
                        ptr.write_bytes(fill, size);
                        slots[slot] = Some(Shadow { ptr, size, fill });
                    }
                    None => {
                        // realloc(null, n) == malloc(n)
                        let ptr = a.realloc(core::ptr::null_mut(), size);
                        assert!(!ptr.is_null(), "realloc(null, {}) failed at op {}", size, i);
                        let fill = fill_byte(&mut rng);
                        ptr.write_bytes(fill, size);
                        slots[slot] = Some(Shadow { ptr, size, fill });
                    }
                },
                Op::Calloc(slot, size) => {
                    if let Some(s) = slots[slot].take() {
                        verify(&s);
                        a.free(s.ptr);
                    }
                    let ptr = a.calloc(1, size);
                    assert!(!ptr.is_null(), "calloc({}) failed at op {}", size, i);
                    for j in 0..size {
                        assert_eq!(ptr.add(j).read(), 0, "calloc dirty at byte {}", j);
                    }
                    let fill = fill_byte(&mut rng);
                    ptr.write_bytes(fill, size);
                    slots[slot] = Some(Shadow { ptr, size, fill });
                }
            }

            if i % 512 == 0 {
                assert!(check::check(a.heap()).is_ok(), "checker rejected at op {}", i);
            }
        }
    }

    // Drain the live set; the heap must collapse back to a consistent,
    // fully coalesced state.
    unsafe {
        for slot in slots.iter_mut() {
            if let Some(s) = slot.take() {
                verify(&s);
                a.free(s.ptr);
            }
        }
        assert!(check::check(a.heap()).is_ok());
        assert_eq!(
            a.heap().free_block_count(),
            1,
            "drained heap should coalesce into one block"
        );
    }
}

#[test]
fn trace_small_mixed() {
    replay(0xDEADBEEF, 2000);
}

#[test]
fn trace_alloc_heavy() {
    replay(42, 3000);
}

#[test]
fn trace_churn() {
    replay(0xC0FFEE, 4000);
}
