//! A cooperative, deadline-ordered task scheduler for resource-constrained,
//! single-core embedded systems.
//!
//! No heap allocator is required: every task is caller-owned storage
//! embedding an intrusive link cell, threaded through a sentinel-headed
//! circular list ([`list`]). Submissions from interrupt context cross into
//! main context over a lock-free single-producer/single-consumer ring
//! ([`channel`]). The scheduling policy is earliest-deadline-first with
//! FIFO tie-breaking among equal deadlines, implemented by [`scheduler`].
//!
//! Two ways to use this crate:
//!
//! - Own a [`scheduler::Scheduler`] value directly (and an
//!   [`channel::IsrChannel`] alongside it) — the explicit API, suited to
//!   custom singleton placement, multiple schedulers, or unit tests against
//!   a virtual clock.
//! - Use the [`global`] module's free functions, which wrap a single
//!   process-lifetime scheduler behind a lock, for the common case of one
//!   scheduler per firmware image.
//!
//! ```
//! use sentinel_sched::{channel::IsrChannel, clock::Instant, scheduler::Scheduler, task::Task};
//! use core::ptr::NonNull;
//!
//! fn blink(_ctx: *mut core::ffi::c_void, _arg: *mut core::ffi::c_void) {}
//!
//! fn now() -> Instant {
//!     Instant::from_ticks(0)
//! }
//!
//! let mut sched = Scheduler::new(now);
//! sched.init();
//! let isr: IsrChannel<8> = IsrChannel::new();
//!
//! let mut task = Task::new(blink, core::ptr::null_mut(), Some("blink"));
//! sched.submit_now(NonNull::from(&mut task)).unwrap();
//! sched.step(&isr);
//! ```
#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod channel;
pub mod clock;
pub mod error;
pub mod global;
pub mod list;
pub mod scheduler;
pub mod task;

pub use channel::IsrChannel;
pub use clock::{ClockSource, Duration, Instant};
pub use error::{Error, Status};
pub use scheduler::Scheduler;
pub use task::Task;
