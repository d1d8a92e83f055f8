//! Monotonic time abstraction (C1).
//!
//! The scheduler never compares raw tick counts with `<`/`>` — on a wrapping
//! counter that can underflow silently and corrupt ordering. Every
//! comparison goes through [`Instant::precedes`] / [`Instant::follows`],
//! which treat the tick count as a circular sequence number (the same trick
//! TCP uses for 32-bit sequence numbers, generalized to `u64`): `a` precedes
//! `b` iff the wrapping difference `b.wrapping_sub(a)` is a positive value
//! in the "near" half of the domain.

use core::ops::Add;

/// An opaque point in time, as ticks since some unspecified epoch.
///
/// `Instant` intentionally has no public constructor from a raw scalar other
/// than [`Instant::from_ticks`] — callers should get instants from a
/// [`ClockSource`], not by inventing them, except in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instant(u64);

/// A tick count, not an instant — the type `reschedule_in`/`submit_in` take.
pub type Duration = u64;

impl Instant {
    /// Wrap a raw tick count. Exposed for clock sources and tests (virtual
    /// clocks, scenario setup); ordinary scheduler code should only ever
    /// receive `Instant`s from a [`ClockSource`] or from `Task::get_time`.
    pub const fn from_ticks(ticks: u64) -> Self {
        Instant(ticks)
    }

    /// The raw tick count underlying this instant.
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Strict "happens before", accounting for wraparound.
    ///
    /// Treats the gap between two ticks as a signed 64-bit quantity: if the
    /// wrapping distance from `self` to `other` is positive and less than
    /// half the domain, `self` precedes `other`. This is undefined only in
    /// the degenerate case where the true gap is exactly half the domain
    /// (2^63 ticks apart) — a condition no real clock reaches in the
    /// scheduler's lifetime.
    pub fn precedes(self, other: Instant) -> bool {
        let diff = other.0.wrapping_sub(self.0);
        diff != 0 && diff < (1u64 << 63)
    }

    /// Strict inverse of [`Instant::precedes`].
    pub fn follows(self, other: Instant) -> bool {
        other.precedes(self)
    }

    /// `self`, advanced by `d` ticks, wrapping at the domain boundary.
    pub fn offset(self, d: Duration) -> Instant {
        Instant(self.0.wrapping_add(d))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        self.offset(rhs)
    }
}

/// A function returning the current time — a plain fn pointer, not a trait
/// object or a heap-allocated closure, so it costs nothing to store or copy.
pub type ClockSource = fn() -> Instant;

/// A [`ClockSource`] that can be read and swapped from interrupt context
/// without taking any lock.
///
/// A plain `ClockSource` field would force `Scheduler::set_clock_source`
/// and any interrupt-context reader (`submit_isr_*`) to agree on some other
/// synchronization; storing the function pointer's bit pattern in an
/// `AtomicUsize` instead gives both sides a torn-read-free view at the cost
/// of one `transmute` back to a callable pointer, which is sound because a
/// `fn() -> Instant` and a `usize` are always the same width on every
/// target this crate supports.
pub struct AtomicClockSource(core::sync::atomic::AtomicUsize);

impl AtomicClockSource {
    /// Wrap an initial clock source.
    pub const fn new(initial: ClockSource) -> Self {
        AtomicClockSource(core::sync::atomic::AtomicUsize::new(initial as usize))
    }

    /// The currently installed clock source.
    pub fn get(&self) -> ClockSource {
        let addr = self.0.load(core::sync::atomic::Ordering::Acquire);
        // SAFETY: only ever stored by `set`/`new`, which only ever store a
        // `ClockSource` value cast to `usize`.
        unsafe { core::mem::transmute::<usize, ClockSource>(addr) }
    }

    /// Install a new clock source.
    pub fn set(&self, f: ClockSource) {
        self.0.store(f as usize, core::sync::atomic::Ordering::Release);
    }

    /// Read the current time from the installed clock source.
    pub fn now(&self) -> Instant {
        (self.get())()
    }
}

#[cfg(feature = "platform-clock")]
mod platform {
    use super::Instant;
    use core::sync::atomic::{AtomicU64, Ordering};

    /// Software tick counter, advanced by [`tick`]. Stands in for a real
    /// platform timer/RTC peripheral, which this crate does not own — board
    /// crates wire their timer interrupt to call [`tick`] and register
    /// [`now`] as the [`ClockSource`](super::ClockSource).
    static TICKS: AtomicU64 = AtomicU64::new(0);

    /// Advance the platform clock by one tick. Call from a timer interrupt.
    pub fn tick() {
        TICKS.fetch_add(1, Ordering::Relaxed);
    }

    /// The default [`ClockSource`] when the `platform-clock` feature is on.
    pub fn now() -> Instant {
        Instant::from_ticks(TICKS.load(Ordering::Relaxed))
    }
}

#[cfg(feature = "platform-clock")]
pub use platform::{now as default_clock, tick};
