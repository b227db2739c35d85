//! Process-wide dense thread-id allocator.
//!
//! Hands every live thread a small, distinct `usize` suitable for indexing a
//! fixed-size array (the [`crate::BravoMutex`] slot table), and recycles that
//! index when the thread exits. Ported from `tsutil/DenseThreadId.h`: a
//! free-list stack threaded through a single `Vec<usize>`, guarded by one
//! mutex, plus a `thread_local!` handle whose constructor does the only
//! locking a given thread ever needs for this allocator.

use std::sync::Mutex;

use crate::error::fatal_error;

/// Default capacity used if [`set_capacity`] is never called before the
/// first [`current`].
const DEFAULT_CAPACITY: usize = 256;

struct FreeList {
    /// `next[i]` is the free index to hand out after `i`, forming an
    /// intrusive singly linked stack. Has `capacity + 1` entries; index
    /// `capacity` is the sentinel meaning "stack empty".
    next: Vec<usize>,
    /// Index of the next slot to allocate, or `capacity` when the stack is
    /// empty.
    top: usize,
    /// The finalized capacity, valid once `inited` is true.
    capacity: usize,
    /// Becomes true the first time the capacity is finalized, either by an
    /// explicit `set_capacity` call or lazily by the first `current()`/
    /// `capacity()` call. Once true, `set_capacity` is a contract violation.
    inited: bool,
}

impl FreeList {
    const fn new() -> Self {
        FreeList { next: Vec::new(), top: 0, capacity: 0, inited: false }
    }

    fn init(&mut self, capacity: usize) {
        // next[i] = i + 1 for every valid index; next[capacity - 1] == capacity,
        // which is exactly the sentinel `alloc` checks for, so the array never
        // needs an entry at index `capacity` itself.
        self.next = (0..capacity).map(|i| i + 1).collect();
        self.top = 0;
        self.capacity = capacity;
        self.inited = true;
    }

    fn ensure_inited(&mut self) {
        if !self.inited {
            self.init(DEFAULT_CAPACITY);
        }
    }

    fn alloc(&mut self) -> usize {
        self.ensure_inited();
        if self.top == self.capacity {
            fatal_error!(
                "DenseThreadId: number of live threads exceeded capacity ({})",
                self.capacity
            );
        }
        let val = self.top;
        self.top = self.next[val];
        val
    }

    fn release(&mut self, val: usize) {
        self.next[val] = self.top;
        self.top = val;
    }
}

static STATE: Mutex<FreeList> = Mutex::new(FreeList::new());

/// Per-thread handle: allocates an index on construction, returns it to the
/// free list on drop. Rust thread-locals run `Drop` at thread exit on every
/// target the standard library supports, so this needs no separate
/// "release the current thread's id" escape hatch.
struct Handle {
    val: usize,
}

impl Handle {
    fn new() -> Self {
        let mut state = STATE.lock().unwrap_or_else(|e| e.into_inner());
        Handle { val: state.alloc() }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let mut state = STATE.lock().unwrap_or_else(|e| e.into_inner());
        state.release(self.val);
    }
}

thread_local! {
    static HANDLE: Handle = Handle::new();
}

/// A process-wide allocator of small, recyclable thread-indices.
///
/// All operations are associated functions over global state; there is
/// nothing to construct. Named `DenseThreadId` (rather than a free function)
/// to keep a single, greppable name for the whole facility, matching the
/// static-method shape of the C++ original.
pub struct DenseThreadId {
    _private: (),
}

impl DenseThreadId {
    /// One-shot configuration of the total number of distinct indices this
    /// allocator will ever dispense. Must be called, if at all, before any
    /// thread calls [`current`](Self::current) or
    /// [`capacity`](Self::capacity). Both of those finalize a default
    /// capacity of 256 the first time either runs.
    ///
    /// Fails with a fatal error if the capacity has already been finalized
    /// (by an earlier `set_capacity` call, or by `current`/`capacity` running
    /// first), or if `n == 0`.
    pub fn set_capacity(n: usize) {
        if n == 0 {
            fatal_error!("DenseThreadId::set_capacity requires capacity > 0");
        }
        let mut state = STATE.lock().unwrap_or_else(|e| e.into_inner());
        if state.inited {
            fatal_error!(
                "DenseThreadId::set_capacity called after the allocator was already \
                 finalized (either an earlier set_capacity call, or a thread already \
                 called current()/capacity())"
            );
        }
        state.init(n);
    }

    /// Returns the calling thread's dense index, allocating one on first
    /// call. Subsequent calls from the same thread are a thread-local read
    /// with no locking.
    pub fn current() -> usize {
        HANDLE.with(|h| h.val)
    }

    /// Returns the configured capacity, finalizing the default (256) if
    /// neither `set_capacity` nor `current` has run yet.
    pub fn capacity() -> usize {
        let mut state = STATE.lock().unwrap_or_else(|e| e.into_inner());
        state.ensure_inited();
        state.capacity
    }
}
