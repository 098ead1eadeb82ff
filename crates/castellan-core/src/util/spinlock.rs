use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};

use lock_api::{GuardSend, RawMutex};

/// Test-and-test-and-set spinlock, padded to its own cache line.
///
/// Split points are locked and released many times per node, for critical
/// sections of a few loads and stores; parking through an OS mutex would
/// dominate the cost. Waiters spin on a plain load so the line stays shared
/// between acquisition attempts, and yield the CPU now and then in case the
/// holder has been descheduled.
#[repr(align(64))]
pub struct RawSpinLock {
    locked: AtomicBool,
}

impl RawSpinLock {
    /// Spins reading until the lock looks free.
    #[cold]
    fn wait_until_free(&self) {
        let mut spins: u32 = 0;
        while self.locked.load(Ordering::Relaxed) {
            spins = spins.wrapping_add(1);
            if spins % 2048 == 0 {
                std::thread::yield_now();
            } else {
                spin_loop();
            }
        }
    }
}

unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: RawSpinLock = RawSpinLock {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    #[inline]
    fn lock(&self) {
        while !self.try_lock() {
            self.wait_until_free();
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}
