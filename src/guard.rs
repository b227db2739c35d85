//! RAII guard for the shared (read) side of a [`BravoMutex`].
//!
//! Ported from `ts::bravo::shared_lock<Mutex>`. There is no equivalent guard
//! for the exclusive side: `lock`/`try_lock`/`unlock` are called directly on
//! `BravoMutex` for writers, mirroring the C++ original, which lets callers
//! use a plain `std::lock_guard` for that side since no token needs to
//! travel with it.

use lock_api::RawRwLock;

use crate::clock::Clock;
use crate::error::fatal_error;
use crate::mutex::BravoMutex;
use crate::token::Token;

/// A scoped shared (read) lock on a [`BravoMutex`].
///
/// Analogous to `std::sync::RwLockReadGuard`, except it also remembers which
/// path (fast or slow) the lock took, via its [`Token`], so that releasing it
/// is O(1) regardless of path. Movable, not `Clone`.
pub struct SharedLockGuard<
    'a,
    R: RawRwLock = parking_lot::RawRwLock,
    C: Clock = crate::clock::SystemClock,
    const SLOT_COUNT: usize = 256,
    const SLOWDOWN_GUARD: u32 = 7,
> {
    mutex: &'a BravoMutex<R, C, SLOT_COUNT, SLOWDOWN_GUARD>,
    token: Token,
    owns: bool,
}

impl<'a, R: RawRwLock, C: Clock, const SLOT_COUNT: usize, const SLOWDOWN_GUARD: u32>
    SharedLockGuard<'a, R, C, SLOT_COUNT, SLOWDOWN_GUARD>
{
    /// Locks `mutex` now (blocking).
    pub fn new(mutex: &'a BravoMutex<R, C, SLOT_COUNT, SLOWDOWN_GUARD>) -> Self {
        let token = mutex.lock_shared();
        SharedLockGuard { mutex, token, owns: true }
    }

    /// Attempts to lock `mutex` now (non-blocking); check [`owns_lock`](Self::owns_lock)
    /// to see whether it succeeded.
    pub fn try_new(
        mutex: &'a BravoMutex<R, C, SLOT_COUNT, SLOWDOWN_GUARD>,
    ) -> Option<Self> {
        mutex
            .try_lock_shared()
            .map(|token| SharedLockGuard { mutex, token, owns: true })
    }

    /// Remembers `mutex` without locking it yet.
    pub fn new_deferred(mutex: &'a BravoMutex<R, C, SLOT_COUNT, SLOWDOWN_GUARD>) -> Self {
        SharedLockGuard { mutex, token: Token::default(), owns: false }
    }

    /// Locks the remembered mutex (blocking). Fatal error if already held.
    pub fn lock(&mut self) {
        if self.owns {
            fatal_error!("SharedLockGuard::lock called while already holding the lock");
        }
        self.token = self.mutex.lock_shared();
        self.owns = true;
    }

    /// Attempts to lock the remembered mutex (non-blocking). Fatal error if
    /// already held.
    pub fn try_lock(&mut self) -> bool {
        if self.owns {
            fatal_error!("SharedLockGuard::try_lock called while already holding the lock");
        }
        match self.mutex.try_lock_shared() {
            Some(token) => {
                self.token = token;
                self.owns = true;
                true
            }
            None => false,
        }
    }

    /// Releases the lock early. Fatal error if not currently held.
    pub fn unlock(&mut self) {
        if !self.owns {
            fatal_error!("SharedLockGuard::unlock called while not holding the lock");
        }
        // Safety: `owns` is only true while `token` is a handle this guard
        // received from a successful acquisition on `self.mutex` that has
        // not yet been released.
        unsafe { self.mutex.unlock_shared(self.token) };
        self.owns = false;
        self.token = Token::default();
    }

    /// Swaps state with `other`, including which mutex each refers to.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Releases ownership of the underlying lock (without unlocking it) and
    /// returns the mutex it was guarding. The caller becomes responsible for
    /// eventually calling `unlock_shared` with this guard's former token.
    pub fn release(mut self) -> &'a BravoMutex<R, C, SLOT_COUNT, SLOWDOWN_GUARD> {
        self.owns = false;
        self.mutex
    }

    /// Whether this guard currently holds the lock.
    pub fn owns_lock(&self) -> bool {
        self.owns
    }

    /// The token this guard is holding (or would release, if it currently
    /// owns the lock). Meaningless if `owns_lock()` is false.
    pub fn token(&self) -> Token {
        self.token
    }

    /// The mutex this guard borrows.
    pub fn mutex(&self) -> &'a BravoMutex<R, C, SLOT_COUNT, SLOWDOWN_GUARD> {
        self.mutex
    }
}

impl<R: RawRwLock, C: Clock, const SLOT_COUNT: usize, const SLOWDOWN_GUARD: u32> Drop
    for SharedLockGuard<'_, R, C, SLOT_COUNT, SLOWDOWN_GUARD>
{
    fn drop(&mut self) {
        if self.owns {
            // Safety: same invariant as `unlock` above.
            unsafe { self.mutex.unlock_shared(self.token) };
        }
    }
}
