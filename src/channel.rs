//! Single-producer/single-consumer ISR handoff channel (C4).
//!
//! Carries task submissions from interrupt context to main context without
//! ever blocking the producer. Capacity is fixed at compile time via the
//! const generic `Q`, so there is no allocation and no failure mode beyond
//! "full" — an SPSC ring over an interrupts-disabled intrusive-list
//! alternative, since it needs no critical section on either side.
//!
//! Producer: any number of interrupt contexts, but the platform guarantees
//! serialized ISR entry on this class of system, so at most one producer
//! call is ever in flight. Consumer: main context only, inside
//! [`crate::scheduler::Scheduler::step`].
//!
//! # Memory ordering
//!
//! The store of a task pointer into a slot happens-before the `head`
//! advance the consumer observes (`Release` on the head store, `Acquire`
//! on the consumer's head load). The load of a slot happens-before the
//! `tail` advance that republishes it to the producer (`Release` on the
//! tail store, `Acquire` on the producer's tail load). This is the
//! standard SPSC head/tail discipline; on single-core targets the atomics
//! degrade to plain compiler fences, but the code is written to be correct
//! on SMP targets too.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Error;
use crate::task::Task;

/// A bounded SPSC ring of `NonNull<Task>`, capacity `Q` fixed at the type
/// level. `Q` need not be a power of two (the index arithmetic below uses
/// modulo, not masking, to keep the API honest about arbitrary capacities —
/// callers who want the masking fast path should pick a power-of-two `Q`
/// themselves, which costs nothing extra here since `% Q` on a
/// power-of-two constant optimizes to the same mask).
pub struct IsrChannel<const Q: usize> {
    slots: [UnsafeCell<MaybeUninit<NonNull<Task>>>; Q],
    head: AtomicUsize,
    tail: AtomicUsize,
}

// SAFETY: `slots` is only ever written by the single producer and read by
// the single consumer, coordinated by the `head`/`tail` acquire/release
// protocol below; no two contexts touch the same slot concurrently.
unsafe impl<const Q: usize> Sync for IsrChannel<Q> {}

impl<const Q: usize> IsrChannel<Q> {
    /// An empty channel. `Q` must be at least 1; a zero-capacity channel
    /// compiles but rejects every `put`.
    pub const fn new() -> Self {
        const EMPTY: UnsafeCell<MaybeUninit<NonNull<Task>>> =
            UnsafeCell::new(MaybeUninit::uninit());
        IsrChannel {
            slots: [EMPTY; Q],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Main-context only: empty the channel, discarding any pending
    /// submissions. Not safe to call concurrently with `put`/`get`.
    pub fn reset(&self) {
        let tail = self.tail.load(Ordering::Relaxed);
        self.head.store(tail, Ordering::Release);
    }

    /// Producer (ISR context): enqueue `task`. Never blocks. `Err(Error::
    /// Full)` if the ring has no free slot; the caller decides whether to
    /// drop, count, or assert.
    ///
    /// # Safety
    /// Must not be called concurrently with another `put` (the platform's
    /// single-producer guarantee); may be called concurrently with `get`.
    pub unsafe fn put(&self, task: NonNull<Task>) -> Result<(), Error> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= Q {
            return Err(Error::Full);
        }
        let idx = head % Q;
        // SAFETY: this slot is not the one the consumer may currently be
        // reading (that slot is at `tail % Q`, and `head != tail` mod Q
        // range here since the ring isn't full), and no other producer
        // call can race this one.
        unsafe {
            (*self.slots[idx].get()).write(task);
        }
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer (main context): dequeue the oldest pending submission, or
    /// `None` if the channel is empty. Never blocks.
    pub fn get(&self) -> Option<NonNull<Task>> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let idx = tail % Q;
        // SAFETY: `head != tail`, so this slot was published by a completed
        // `put` (its `Release` store of `head` happens-before this
        // `Acquire` load), and the consumer is the only reader.
        let task = unsafe { (*self.slots[idx].get()).assume_init() };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(task)
    }

    /// Number of pending submissions. `O(1)`, main-context or producer
    /// diagnostics only (the true count is racy if read concurrently with
    /// the other side, by design — it is advisory, not load-bearing).
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// True iff no submissions are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff the ring has no free slot for another `put`.
    pub fn is_full(&self) -> bool {
        self.len() >= Q
    }
}

impl<const Q: usize> Default for IsrChannel<Q> {
    fn default() -> Self {
        IsrChannel::new()
    }
}
