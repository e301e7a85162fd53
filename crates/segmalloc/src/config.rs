use crate::util::{DEFAULT_HEAP_LIMIT, DEFAULT_LOOKAHEAD};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Cached config values (read once at init, never allocate).
static HEAP_LIMIT: AtomicUsize = AtomicUsize::new(DEFAULT_HEAP_LIMIT);
static LOOKAHEAD: AtomicUsize = AtomicUsize::new(DEFAULT_LOOKAHEAD);

/// Read configuration from environment variables.
/// Must be called during init, before any allocations.
///
/// # Safety
/// Must be called from single-threaded context (init).
pub unsafe fn read_config() {
    if let Some(val) = getenv_usize(b"SEGMALLOC_HEAP_LIMIT\0") {
        if val > 0 {
            HEAP_LIMIT.store(val, Ordering::Relaxed);
        }
    }
    if let Some(val) = getenv_usize(b"SEGMALLOC_LOOKAHEAD\0") {
        if val > 0 {
            LOOKAHEAD.store(val, Ordering::Relaxed);
        }
    }
}

/// Hard cap on total arena size in bytes.
pub fn heap_limit() -> usize {
    HEAP_LIMIT.load(Ordering::Relaxed)
}

/// Number of free-list entries examined past the first fit.
pub fn lookahead() -> usize {
    LOOKAHEAD.load(Ordering::Relaxed)
}

/// Parse an environment variable as a usize.
///
/// # Safety
/// Calls libc::getenv.
unsafe fn getenv_usize(key: &[u8]) -> Option<usize> {
    let val = libc::getenv(key.as_ptr() as *const libc::c_char);
    if val.is_null() {
        return None;
    }

    // Parse manually (no std allocation)
    let mut result: usize = 0;
    let mut ptr = val as *const u8;
    loop {
        let byte = *ptr;
        if byte == 0 {
            break;
        }
        if !byte.is_ascii_digit() {
            return None; // Invalid
        }
        result = result.checked_mul(10)?.checked_add((byte - b'0') as usize)?;
        ptr = ptr.add(1);
    }
    Some(result)
}
