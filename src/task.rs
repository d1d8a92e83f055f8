//! Task descriptor (C3): a callable bound with context, a scheduled
//! deadline, and an embedded link cell.

use core::ffi::c_void;

use crate::clock::Instant;
use crate::impl_linked;
use crate::list::LinkNode;

/// `(ctx, arg) -> ()`. `ctx` is bound at [`Task::new`]; `arg` is whatever
/// the scheduler passes to [`Task::call`] (always null, in practice — the
/// scheduler never synthesizes a meaningful `arg`, but the signature
/// carries one so callables can be reused as, e.g., ISR handlers elsewhere
/// that do pass one).
pub type TaskFn = fn(ctx: *mut c_void, arg: *mut c_void);

#[cfg(feature = "profiling")]
#[derive(Debug, Clone, Copy, Default)]
struct Profile {
    call_count: u64,
    cumulative_ticks: u64,
    peak_ticks: u64,
}

/// A schedulable unit of work.
///
/// A `Task` has no knowledge of which scheduler, if any, holds it — it is
/// purely a (callable, deadline, link cell, name) tuple. Callers own the
/// memory a `Task` lives in and must keep it alive for as long as it is
/// linked into a scheduler or is its `current_task`.
pub struct Task {
    func: TaskFn,
    ctx: *mut c_void,
    deadline: Instant,
    name: Option<&'static str>,
    pub(crate) link: LinkNode,
    #[cfg(feature = "profiling")]
    profile: Profile,
}

// SAFETY: a `Task`'s `ctx` pointer is an opaque caller-supplied handle; this
// crate never dereferences it itself, only threads it through to `func`.
// Whether that's actually `Send`/`Sync`-safe is the caller's obligation, the
// same one `ctx: *mut c_void` already places on them.
unsafe impl Send for Task {}

impl_linked!(Task, link);

impl Task {
    /// Bind a callable with its context and an optional display name. The
    /// deadline starts at `Instant::from_ticks(0)` — the earliest possible
    /// time — until a `submit_*`/`set_time` call gives it a real one.
    pub const fn new(func: TaskFn, ctx: *mut c_void, name: Option<&'static str>) -> Self {
        Task {
            func,
            ctx,
            deadline: Instant::from_ticks(0),
            name,
            link: LinkNode::new(),
            #[cfg(feature = "profiling")]
            profile: Profile { call_count: 0, cumulative_ticks: 0, peak_ticks: 0 },
        }
    }

    /// A task that does nothing. Used as the default idle task.
    pub const fn noop(name: Option<&'static str>) -> Self {
        fn noop_fn(_ctx: *mut c_void, _arg: *mut c_void) {}
        Task::new(noop_fn, core::ptr::null_mut(), name)
    }

    /// The task's scheduled deadline.
    pub fn get_time(&self) -> Instant {
        self.deadline
    }

    /// Overwrite the task's deadline. Mutated only by the scheduler and by
    /// `Scheduler::reschedule_*`/`submit_*` — calling this directly on a
    /// task that is currently linked does not reorder it in the list; go
    /// through `Scheduler::submit_at` for that.
    pub fn set_time(&mut self, t: Instant) {
        self.deadline = t;
    }

    /// True iff this task's link cell is currently a member of any list.
    /// The scheduler further splits this into `Scheduled` vs. `Runnable`
    /// based on whether the deadline has arrived yet.
    pub fn is_scheduled(&self) -> bool {
        !self.link.is_detached()
    }

    /// The task's display name, if it was given one.
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Invoke the bound callable with `arg`. Under the `profiling` feature,
    /// the call is wrapped instead (see the other `call` overload below) to
    /// record a call count and a runtime delta.
    #[cfg(not(feature = "profiling"))]
    pub fn call(&mut self, arg: *mut c_void) {
        (self.func)(self.ctx, arg);
    }

    /// Invoke the bound callable, recording call count and elapsed ticks.
    #[cfg(feature = "profiling")]
    pub fn call(&mut self, arg: *mut c_void, clock: crate::clock::ClockSource) {
        let start = clock();
        (self.func)(self.ctx, arg);
        let end = clock();
        let elapsed = end.ticks().wrapping_sub(start.ticks());
        self.profile.call_count += 1;
        self.profile.cumulative_ticks = self.profile.cumulative_ticks.wrapping_add(elapsed);
        if elapsed > self.profile.peak_ticks {
            self.profile.peak_ticks = elapsed;
        }
    }

    /// Number of times this task has run, if `profiling` is enabled.
    #[cfg(feature = "profiling")]
    pub fn call_count(&self) -> u64 {
        self.profile.call_count
    }

    /// Total ticks spent inside this task's callable, if `profiling` is
    /// enabled.
    #[cfg(feature = "profiling")]
    pub fn cumulative_ticks(&self) -> u64 {
        self.profile.cumulative_ticks
    }

    /// The longest single run of this task, if `profiling` is enabled.
    #[cfg(feature = "profiling")]
    pub fn peak_ticks(&self) -> u64 {
        self.profile.peak_ticks
    }
}
