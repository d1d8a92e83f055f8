//! Error and status taxonomy shared by the ISR channel and the scheduler core.

use core::fmt;

/// Failure modes for the public scheduler API.
///
/// There is no "success" variant on purpose — success is `Result::Ok(())`,
/// not a sentinel. Every fallible operation in this crate is atomic from the
/// caller's point of view: either it fully applied, or the state is
/// unchanged and one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The ISR channel had no capacity left for a `submit_isr_*` call.
    #[error("ISR channel is full")]
    Full,

    /// A task to be removed or rescheduled was not in the expected state
    /// (e.g. `remove` on a task that was never linked, or `reschedule_*`
    /// with no `current_task`).
    #[error("task not found")]
    NotFound,

    /// A submission API was handed a null task pointer.
    #[error("task pointer was null")]
    NullTask,

    /// `get()` found nothing to drain. Internal to the channel; the
    /// scheduler's drain loop treats this as "stop draining", not a
    /// propagated error.
    #[error("channel is empty")]
    Empty,
}

/// Where a task currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Detached: not linked into the task list, and not `current_task`.
    Idle,
    /// Linked into the task list, deadline still in the future.
    Scheduled,
    /// Linked into the task list, deadline has already arrived.
    Runnable,
    /// Currently executing (`== current_task`).
    Active,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Idle => "idle",
            Status::Scheduled => "scheduled",
            Status::Runnable => "runnable",
            Status::Active => "active",
        };
        f.write_str(s)
    }
}
