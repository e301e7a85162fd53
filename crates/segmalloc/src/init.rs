use crate::allocator::SeglistAllocator;
use crate::config;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;
const FAILED: u8 = 3;

pub static INIT_STATE: AtomicU8 = AtomicU8::new(UNINIT);

struct AllocatorHolder(UnsafeCell<SeglistAllocator>);
unsafe impl Sync for AllocatorHolder {}

static ALLOCATOR: AllocatorHolder = AllocatorHolder(UnsafeCell::new(SeglistAllocator::new()));

/// Serializes [`with_allocator`], the only path to the global instance.
/// Every critical section is one allocator operation -- a bounded list
/// scan or heap walk, no syscalls past the occasional arena commit --
/// so contention spins briefly and then yields the CPU instead of
/// sleeping in the kernel. std::sync::Mutex is off the table: it may
/// allocate, and the allocator must never re-enter itself.
struct AbiLock {
    held: AtomicBool,
}

impl AbiLock {
    const fn new() -> Self {
        AbiLock {
            held: AtomicBool::new(false),
        }
    }

    fn acquire(&self) {
        while self.held.swap(true, Ordering::Acquire) {
            let mut spins = 0u32;
            while self.held.load(Ordering::Relaxed) {
                if spins < 64 {
                    spins += 1;
                    core::hint::spin_loop();
                } else {
                    #[cfg(unix)]
                    unsafe {
                        libc::sched_yield();
                    }
                    #[cfg(not(unix))]
                    core::hint::spin_loop();
                }
            }
        }
    }

    fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}

static LOCK: AbiLock = AbiLock::new();

/// Initialize the process-wide allocator instance. Idempotent: the
/// first caller wins, concurrent callers spin until it finishes.
pub unsafe fn segmalloc_init() {
    match INIT_STATE.compare_exchange(UNINIT, INITIALIZING, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {}
        Err(INITIALIZING) => {
            while INIT_STATE.load(Ordering::Acquire) == INITIALIZING {
                core::hint::spin_loop();
            }
            return;
        }
        Err(_) => return,
    }

    // Read config from env vars before the arena is sized.
    config::read_config();

    if !(*ALLOCATOR.0.get()).init() {
        INIT_STATE.store(FAILED, Ordering::Release);
        return;
    }

    INIT_STATE.store(READY, Ordering::Release);
}

#[cold]
#[inline(never)]
pub unsafe fn ensure_initialized() {
    segmalloc_init();
}

/// Run `f` against the global instance under the ABI lock.
///
/// # Safety
/// The allocator must be initialized (state READY) and `f` must not
/// re-enter the allocator.
pub unsafe fn with_allocator<R>(f: impl FnOnce(&mut SeglistAllocator) -> R) -> R {
    LOCK.acquire();
    let result = f(&mut *ALLOCATOR.0.get());
    LOCK.release();
    result
}

#[inline(always)]
pub fn state() -> u8 {
    INIT_STATE.load(Ordering::Acquire)
}

pub const STATE_READY: u8 = READY;
pub const STATE_FAILED: u8 = FAILED;
