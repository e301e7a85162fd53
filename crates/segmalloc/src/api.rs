//! C ABI surface over the global allocator instance.
//!
//! The exports carry an `sm_` prefix rather than interposing on the
//! libc names: segmalloc manages one bounded arena and is meant to be
//! linked and called explicitly, not preloaded under a whole process.

use crate::init::{self, STATE_READY};
use core::ffi::c_void;
use core::ptr;

/// Check the init state and bail with `$fail` unless the allocator is
/// usable, lazily initializing on first call.
macro_rules! ready_or {
    ($fail:expr) => {
        if init::state() != STATE_READY {
            init::ensure_initialized();
            if init::state() != STATE_READY {
                return $fail;
            }
        }
    };
}

/// Arm the allocator. Returns 0 on success, -1 if the arena could not
/// be reserved.
#[no_mangle]
pub unsafe extern "C" fn sm_init() -> libc::c_int {
    init::ensure_initialized();
    if init::state() == STATE_READY {
        0
    } else {
        -1
    }
}

#[no_mangle]
pub unsafe extern "C" fn sm_malloc(size: usize) -> *mut c_void {
    ready_or!(ptr::null_mut());
    init::with_allocator(|a| a.malloc(size)) as *mut c_void
}

#[no_mangle]
pub unsafe extern "C" fn sm_free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    ready_or!(());
    init::with_allocator(|a| a.free(ptr as *mut u8));
}

#[no_mangle]
pub unsafe extern "C" fn sm_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    ready_or!(ptr::null_mut());
    init::with_allocator(|a| a.realloc(ptr as *mut u8, size)) as *mut c_void
}

#[no_mangle]
pub unsafe extern "C" fn sm_calloc(nmemb: usize, size: usize) -> *mut c_void {
    ready_or!(ptr::null_mut());
    init::with_allocator(|a| a.calloc(nmemb, size)) as *mut c_void
}

#[no_mangle]
pub unsafe extern "C" fn sm_usable_size(ptr: *mut c_void) -> usize {
    if ptr.is_null() {
        return 0;
    }
    ready_or!(0);
    init::with_allocator(|a| a.usable_size(ptr as *mut u8))
}
