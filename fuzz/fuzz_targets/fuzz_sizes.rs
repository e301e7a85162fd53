#![no_main]

use libfuzzer_sys::fuzz_target;
use segmalloc::api::{sm_calloc, sm_free, sm_malloc, sm_usable_size};

// Fuzz target that exercises size boundaries.
// Interprets input as a series of u32 sizes, allocates memory of that
// size, writes to the full extent, verifies alignment, and frees.

fuzz_target!(|data: &[u8]| {
    let mut i = 0;
    while i + 4 <= data.len() {
        // Read a u32 size from the fuzzer input
        let raw_size = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        i += 4;

        // Cap size to prevent exhausting the bounded arena
        let size = (raw_size as usize) % (1024 * 1024); // Max 1 MiB

        let ptr = unsafe { sm_malloc(size) } as *mut u8;
        if size == 0 {
            // malloc(0) returns null by contract
            assert!(ptr.is_null(), "malloc(0) must return null");
            continue;
        }

        if ptr.is_null() {
            continue; // OOM is ok
        }

        // Verify alignment (payloads are 8-byte aligned)
        assert_eq!(
            (ptr as usize) % 8,
            0,
            "malloc({}) returned unaligned pointer {:p}",
            size,
            ptr
        );

        // Write to full extent -- this should not crash
        unsafe {
            std::ptr::write_bytes(ptr, 0xBB, size);
        }

        // Read back and verify
        for j in 0..size {
            assert_eq!(unsafe { *ptr.add(j) }, 0xBB);
        }

        // Usable size covers at least the request
        let usable = unsafe { sm_usable_size(ptr as *mut core::ffi::c_void) };
        assert!(
            usable >= size,
            "sm_usable_size({}) = {} < requested {}",
            size,
            usable,
            size
        );

        unsafe { sm_free(ptr as *mut core::ffi::c_void) };

        // Test calloc for the same size
        if size < 65536 {
            let cptr = unsafe { sm_calloc(1, size) } as *mut u8;
            if !cptr.is_null() {
                // Verify zero-fill
                for j in 0..std::cmp::min(size, 4096) {
                    assert_eq!(unsafe { *cptr.add(j) }, 0, "calloc not zeroed at {}", j);
                }
                unsafe { sm_free(cptr as *mut core::ffi::c_void) };
            }
        }
    }
});
