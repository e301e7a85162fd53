//! Public-API contract tests for segmalloc.
//!
//! These exercise the four-operation interface semantics through an
//! explicit allocator instance.  Each test arms its own arena, so the
//! tests are independent of run order.

use segmalloc::SeglistAllocator;
use std::ptr;

/// Helper: build and arm a private allocator instance.
unsafe fn alloc() -> SeglistAllocator {
    let mut a = SeglistAllocator::new();
    assert!(a.init(), "arena reservation failed");
    a
}

// ---------------------------------------------------------------------------
// malloc(0) returns null; tiny requests still get a usable payload
// ---------------------------------------------------------------------------

#[test]
fn malloc_zero_returns_null() {
    unsafe {
        let mut a = alloc();
        assert!(a.malloc(0).is_null(), "malloc(0) must return null");
        let p = a.malloc(1);
        assert!(!p.is_null(), "malloc(1) must succeed");
        p.write(0xA5);
        assert_eq!(p.read(), 0xA5);
        a.free(p);
    }
}

// ---------------------------------------------------------------------------
// malloc returns 8-byte aligned pointers
// ---------------------------------------------------------------------------

#[test]
fn malloc_returns_8_byte_aligned_pointers() {
    unsafe {
        let mut a = alloc();
        for &size in &[1usize, 2, 4, 7, 8, 15, 16, 17, 31, 32, 33, 64, 100, 256, 1024, 4096] {
            let p = a.malloc(size);
            assert!(!p.is_null(), "malloc({}) returned null", size);
            assert_eq!(
                (p as usize) % 8,
                0,
                "malloc({}) returned pointer {:?} not aligned to 8 bytes",
                size,
                p
            );
            a.free(p);
        }
    }
}

// ---------------------------------------------------------------------------
// free(null) is a no-op
// ---------------------------------------------------------------------------

#[test]
fn free_null_is_noop() {
    unsafe {
        let mut a = alloc();
        // Should not crash or abort.
        a.free(ptr::null_mut());
    }
}

// ---------------------------------------------------------------------------
// realloc(null, n) == malloc(n); realloc(p, 0) frees and returns null
// ---------------------------------------------------------------------------

#[test]
fn realloc_null_acts_as_malloc() {
    unsafe {
        let mut a = alloc();
        let p = a.realloc(ptr::null_mut(), 128);
        assert!(!p.is_null(), "realloc(null, 128) must behave like malloc");
        ptr::write_bytes(p, 0xAB, 128);
        a.free(p);
    }
}

#[test]
fn realloc_to_zero_frees() {
    unsafe {
        let mut a = alloc();
        let p = a.malloc(64);
        assert!(!p.is_null());
        let q = a.realloc(p, 0);
        assert!(q.is_null(), "realloc(p, 0) must free and return null");
        // The freed block is immediately reusable.
        let r = a.malloc(64);
        assert_eq!(r, p);
    }
}

// ---------------------------------------------------------------------------
// calloc: overflow detection and zero fill
// ---------------------------------------------------------------------------

#[test]
fn calloc_overflow_returns_null() {
    unsafe {
        let mut a = alloc();
        // usize::MAX / 2 + 1 elements of size 2 overflows.
        let p = a.calloc(usize::MAX / 2 + 1, 2);
        assert!(
            p.is_null(),
            "calloc with overflowing nmemb*size must return null"
        );
        let q = a.calloc(usize::MAX, usize::MAX);
        assert!(q.is_null(), "calloc(MAX, MAX) must return null");
    }
}

#[test]
fn calloc_returns_zeroed_memory() {
    unsafe {
        let mut a = alloc();
        for &size in &[1usize, 16, 64, 256, 1024, 4096] {
            let p = a.calloc(size, 1);
            assert!(!p.is_null(), "calloc({}, 1) returned null", size);
            let slice = std::slice::from_raw_parts(p, size);
            assert!(
                slice.iter().all(|&b| b == 0),
                "calloc({}, 1) memory is not zero-filled",
                size
            );
            a.free(p);
        }
    }
}

#[test]
fn calloc_recycled_memory_is_zeroed() {
    unsafe {
        let mut a = alloc();
        let p = a.malloc(256);
        ptr::write_bytes(p, 0xFF, 256);
        a.free(p);
        // The dirtied block comes back through calloc and must be clean.
        let q = a.calloc(4, 64);
        assert_eq!(q, p);
        let slice = std::slice::from_raw_parts(q, 256);
        assert!(slice.iter().all(|&b| b == 0), "recycled calloc not zeroed");
        a.free(q);
    }
}

// ---------------------------------------------------------------------------
// usable_size(p) >= requested size
// ---------------------------------------------------------------------------

#[test]
fn usable_size_at_least_requested() {
    unsafe {
        let mut a = alloc();
        for &size in &[1usize, 7, 16, 17, 32, 100, 256, 512, 1024, 4096, 16384] {
            let p = a.malloc(size);
            assert!(!p.is_null(), "malloc({}) returned null", size);
            let usable = a.usable_size(p);
            assert!(
                usable >= size,
                "usable_size({}) = {} < requested {}",
                size,
                usable,
                size
            );
            a.free(p);
        }
        assert_eq!(a.usable_size(ptr::null_mut()), 0);
    }
}

// ---------------------------------------------------------------------------
// Various size allocations are writable end to end
// ---------------------------------------------------------------------------

#[test]
fn various_allocation_sizes() {
    unsafe {
        let mut a = alloc();
        let sizes: Vec<usize> = vec![
            1, 2, 3, 4, 7, 8, 15, 16, 17, 31, 32, 33, 48, 63, 64, 65, 100, 128, 200, 255, 256,
            257, 512, 1000, 1024, 2048, 4096, 8192, 10000, 16384, 65536, 262144, 1048576,
        ];

        for &size in &sizes {
            let p = a.malloc(size);
            assert!(!p.is_null(), "malloc({}) returned null", size);

            // Write a pattern to verify the memory is usable.
            ptr::write_bytes(p, 0xAA, size);
            let slice = std::slice::from_raw_parts(p, size);
            assert!(
                slice.iter().all(|&b| b == 0xAA),
                "malloc({}) memory is not writable/readable",
                size
            );

            a.free(p);
        }
    }
}

// ---------------------------------------------------------------------------
// Realloc round trips preserve data in both directions
// ---------------------------------------------------------------------------

#[test]
fn realloc_grow_preserves_data() {
    unsafe {
        let mut a = alloc();
        let initial = 64;
        let p = a.malloc(initial);
        assert!(!p.is_null());
        for i in 0..initial {
            p.add(i).write((i & 0xFF) as u8);
        }

        let q = a.realloc(p, 256);
        assert!(!q.is_null(), "realloc to larger size returned null");
        for i in 0..initial {
            assert_eq!(
                q.add(i).read(),
                (i & 0xFF) as u8,
                "data corruption at offset {} after realloc",
                i
            );
        }
        a.free(q);
    }
}

#[test]
fn realloc_shrink_preserves_data() {
    unsafe {
        let mut a = alloc();
        let p = a.malloc(256);
        assert!(!p.is_null());
        for i in 0..256usize {
            p.add(i).write((i & 0xFF) as u8);
        }

        let q = a.realloc(p, 32);
        assert!(!q.is_null());
        for i in 0..32usize {
            assert_eq!(
                q.add(i).read(),
                (i & 0xFF) as u8,
                "data corruption at offset {} after shrinking realloc",
                i
            );
        }
        a.free(q);
    }
}

#[test]
fn realloc_chain_preserves_a_growing_prefix() {
    unsafe {
        let mut a = alloc();
        let mut p = a.malloc(16);
        let mut size = 16usize;
        for i in 0..size {
            p.add(i).write(b'x');
        }
        for step in 1..=6 {
            let new_size = size * 2;
            p = a.realloc(p, new_size);
            assert!(!p.is_null(), "realloc step {} failed", step);
            for i in 0..size {
                assert_eq!(p.add(i).read(), b'x', "lost byte {} at step {}", i, step);
            }
            for i in size..new_size {
                p.add(i).write(b'x');
            }
            size = new_size;
        }
        a.free(p);
    }
}

// ---------------------------------------------------------------------------
// OOM: the arena limit caps the heap; failure leaves state intact
// ---------------------------------------------------------------------------

#[test]
fn oom_returns_null_and_old_blocks_survive() {
    unsafe {
        let mut a = alloc();
        let keep = a.malloc(64);
        ptr::write_bytes(keep, 0x5C, 64);

        let mut live = Vec::new();
        loop {
            let p = a.malloc(4 << 20);
            if p.is_null() {
                break;
            }
            live.push(p);
        }
        // realloc that cannot fit anywhere returns null and keeps the
        // old payload.
        let huge = a.realloc(keep, 200 << 20);
        assert!(huge.is_null());
        let slice = std::slice::from_raw_parts(keep, 64);
        assert!(
            slice.iter().all(|&b| b == 0x5C),
            "failed realloc corrupted the original payload"
        );

        for p in live {
            a.free(p);
        }
        a.free(keep);
    }
}

// ---------------------------------------------------------------------------
// Rapid malloc/free cycles stay at a fixed address (steady state)
// ---------------------------------------------------------------------------

#[test]
fn rapid_malloc_free_cycles() {
    unsafe {
        let mut a = alloc();
        let first = a.malloc(64);
        a.free(first);
        for _ in 0..10_000 {
            let p = a.malloc(64);
            assert_eq!(p, first, "steady-state cycle moved the block");
            a.free(p);
        }
    }
}
