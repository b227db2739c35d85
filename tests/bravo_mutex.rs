//! End-to-end tests for `BravoMutex`'s locking contract.
//!
//! Runs against the default capacity (256) and default `SLOT_COUNT` (256);
//! none of these tests configure `DenseThreadId`, so they are safe to run
//! concurrently with each other within this binary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use bravo_rwlock::test_support::VirtualClock;
use bravo_rwlock::{BravoMutex, Token};

#[test]
fn single_thread_sanity() {
    let mutex: BravoMutex = BravoMutex::new();

    let token = mutex.lock_shared();
    unsafe { mutex.unlock_shared(token) };

    mutex.lock();
    unsafe { mutex.unlock() };
}

#[test]
fn reader_reader_overlap_blocks_a_concurrent_writer() {
    let mutex: Arc<BravoMutex> = Arc::new(BravoMutex::new());
    let barrier = Arc::new(Barrier::new(2));

    let m1 = Arc::clone(&mutex);
    let b1 = Arc::clone(&barrier);
    let reader_a = std::thread::spawn(move || {
        let token = m1.lock_shared();
        b1.wait();
        // Hold long enough for the writer attempt below to observe contention.
        std::thread::sleep(Duration::from_millis(50));
        unsafe { m1.unlock_shared(token) };
    });

    let m2 = Arc::clone(&mutex);
    let b2 = Arc::clone(&barrier);
    let reader_b = std::thread::spawn(move || {
        let token = m2.lock_shared();
        b2.wait();
        std::thread::sleep(Duration::from_millis(50));
        unsafe { m2.unlock_shared(token) };
    });

    barrier.wait();
    // Both readers are definitely active now; a writer must not get in.
    std::thread::sleep(Duration::from_millis(10));
    assert!(!mutex.try_lock(), "writer must not acquire while readers are active");

    reader_a.join().unwrap();
    reader_b.join().unwrap();

    // Once both readers are gone the writer succeeds.
    assert!(mutex.try_lock());
    unsafe { mutex.unlock() };
}

#[test]
fn writer_blocks_reader() {
    let mutex: Arc<BravoMutex> = Arc::new(BravoMutex::new());
    mutex.lock();

    let m = Arc::clone(&mutex);
    let result = std::thread::spawn(move || m.try_lock_shared()).join().unwrap();
    assert!(result.is_none());

    unsafe { mutex.unlock() };
}

#[test]
fn writer_blocks_writer() {
    let mutex: Arc<BravoMutex> = Arc::new(BravoMutex::new());
    mutex.lock();

    let m = Arc::clone(&mutex);
    let acquired = std::thread::spawn(move || m.try_lock()).join().unwrap();
    assert!(!acquired);

    unsafe { mutex.unlock() };
}

#[test]
fn try_lock_alternation_is_consistent() {
    let mutex: BravoMutex = BravoMutex::new();
    let counter = AtomicUsize::new(0);

    let token = mutex.try_lock_shared().expect("uncontended shared lock");
    assert_eq!(counter.load(Ordering::Relaxed), 0);
    unsafe { mutex.unlock_shared(token) };

    assert!(mutex.try_lock());
    counter.fetch_add(1, Ordering::Relaxed);
    unsafe { mutex.unlock() };

    let token = mutex.try_lock_shared().expect("uncontended shared lock");
    assert_eq!(counter.load(Ordering::Relaxed), 1);
    unsafe { mutex.unlock_shared(token) };
}

#[test]
fn token_round_trip_leaves_no_trace() {
    let mutex: BravoMutex = BravoMutex::new();

    // Warm up: one slow-path acquisition enables bias (inhibit_until starts
    // at time zero, which any clock reading satisfies).
    let warm_up = mutex.lock_shared();
    assert_eq!(warm_up, Token::SlowPath);
    unsafe { mutex.unlock_shared(warm_up) };

    // Now the fast path should be available.
    let token = mutex.lock_shared();
    assert!(token.is_fast_path(), "expected a fast-path token once bias is enabled");
    unsafe { mutex.unlock_shared(token) };

    // The slot must be free again: another fast-path acquisition from this
    // same thread should get the very same slot.
    let token2 = mutex.lock_shared();
    assert_eq!(token2, token);
    unsafe { mutex.unlock_shared(token2) };
}

#[test]
fn inhibit_window_scales_with_revocation_duration() {
    type VirtualMutex = BravoMutex<parking_lot::RawRwLock, VirtualClock, 256, 7>;

    // `clock` and the handle the mutex is built with share the same
    // underlying counter (see `VirtualClock::clone`), so this test can drive
    // time forward from the outside while the mutex's own revocation code
    // reads the same clock internally.
    let clock = VirtualClock::new();
    let mutex: Arc<VirtualMutex> = Arc::new(VirtualMutex::with_clock(clock.clone()));

    // Enable bias via a slow-path acquisition (inhibit_until starts at zero,
    // and the clock is still at zero, so the re-enable check passes trivially).
    let warm_up = mutex.lock_shared();
    unsafe { mutex.unlock_shared(warm_up) };

    // Take a fast-path reader and hold it open on another thread so the
    // writer's revocation scan has something to wait for.
    let m = Arc::clone(&mutex);
    let (tx, rx) = std::sync::mpsc::channel::<()>();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let reader = std::thread::spawn(move || {
        let token = m.lock_shared();
        assert!(token.is_fast_path());
        tx.send(()).unwrap();
        release_rx.recv().unwrap();
        unsafe { m.unlock_shared(token) };
    });

    rx.recv().unwrap();
    // The writer is about to block in its revocation spin (real wall-clock
    // sleeps) waiting for this slot to clear. While it's blocked, advance the
    // virtual clock by a known duration `d`: since `start` is captured before
    // the scan begins and `end` only after the slot clears, advancing before
    // releasing the reader guarantees `end - start == d` exactly, regardless
    // of how long the writer's real-time spin actually takes.
    let d = Duration::from_millis(50);
    const SLOWDOWN_GUARD: u32 = 7;

    let m = Arc::clone(&mutex);
    let writer = std::thread::spawn(move || m.lock());

    // Give the writer a moment to disable bias and enter its spin before we
    // move the clock and release the reader.
    std::thread::sleep(Duration::from_millis(5));
    clock.advance(d);
    release_tx.send(()).unwrap();

    reader.join().unwrap();
    writer.join().unwrap();
    // `end = d`, `elapsed = d - 0 = d`, `inhibit_until = d + d * SLOWDOWN_GUARD`.
    unsafe { mutex.unlock() };

    // Immediately after the writer releases (clock still at `d`, far short of
    // `inhibit_until = d + 7d = 8d`), a slow-path reader must not re-enable bias.
    let after = mutex.lock_shared();
    assert_eq!(after, Token::SlowPath);
    unsafe { mutex.unlock_shared(after) };

    // Advance the clock up to, but not past, the inhibit deadline
    // (`inhibit_until = d + SLOWDOWN_GUARD * d`, currently sitting at `d`):
    // bias must still stay off (deadline monotonicity: no re-enable strictly
    // before `revocation_end + SLOWDOWN_GUARD * d`).
    clock.advance(d * SLOWDOWN_GUARD - Duration::from_nanos(1));
    let still_inhibited = mutex.lock_shared();
    assert_eq!(still_inhibited, Token::SlowPath);
    unsafe { mutex.unlock_shared(still_inhibited) };

    // Advance past the inhibit deadline: this slow-path reader observes
    // `now() >= inhibit_until` and re-enables bias for whoever comes next.
    clock.advance(Duration::from_nanos(1));
    let reenabling = mutex.lock_shared();
    assert_eq!(reenabling, Token::SlowPath);
    unsafe { mutex.unlock_shared(reenabling) };

    // Bias is back on: the next acquisition from this thread takes the fast path.
    let fast = mutex.lock_shared();
    assert!(fast.is_fast_path(), "bias should have re-enabled once past the inhibit deadline");
    unsafe { mutex.unlock_shared(fast) };
}
