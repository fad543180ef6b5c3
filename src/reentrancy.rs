//! Debug-only writer reentrancy guard.
//!
//! A grow-only table serializes writers on a mutex and calls the key
//! strategy while holding it. A strategy that writes back into the same
//! table from `hash_key`/`keys_equal` would deadlock on that mutex. In debug
//! builds the guard records which thread owns the write section and panics
//! on a nested entry from that thread before it blocks. In release builds
//! it compiles to a zero-cost no-op.

#[cfg(not(debug_assertions))]
use core::marker::PhantomData;
#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicUsize, Ordering};

/// Per-instance reentrancy tracker. Call `check` before taking the writer
/// lock and `enter` once it is held.
#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    owner: AtomicUsize,
}

#[cfg(debug_assertions)]
fn current_thread_token() -> usize {
    thread_local! {
        static TOKEN: u8 = const { 0 };
    }
    TOKEN.with(|t| t as *const u8 as usize)
}

impl DebugReentrancy {
    /// Create a new reentrancy tracker. Const so it can be a field default.
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            owner: AtomicUsize::new(0),
        }
    }

    /// Panics in debug builds if the calling thread is already inside a
    /// guarded section of this instance.
    #[inline]
    #[track_caller]
    pub fn check(&self) {
        #[cfg(debug_assertions)]
        {
            assert!(
                self.owner.load(Ordering::Relaxed) != current_thread_token(),
                "reentrancy detected: nested write into grow-only table"
            );
        }
    }

    /// Mark the calling thread as the owner of the guarded section.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            self.owner.store(current_thread_token(), Ordering::Relaxed);
            ReentrancyGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = self;
            ReentrancyGuard { _z: PhantomData }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.owner.owner.store(0, Ordering::Relaxed);
        }
    }
}
