//! Scheduler core (C5): owns the time-ordered task list and the
//! current/idle task slots, and implements the public scheduling API.
//!
//! This is the pure, single-threaded engine: every method here assumes it
//! is the only thing touching `self` for the duration of the call — the
//! task list requires no locking provided no operation on it is ever
//! invoked from an ISR. The ISR-safe boundary — the actual guarantee that
//! interrupt-context submissions never race main-context scheduler
//! mutation — is drawn one layer up, in
//! [`crate::global`], which keeps the [`IsrChannel`] in its own `'static`
//! storage outside of whatever lock guards this type. `Scheduler` itself
//! takes the channel as a borrowed parameter to `step`/`submit_isr_*`
//! rather than owning it, so that separation is structural, not just
//! documented.

use core::ptr::NonNull;

#[cfg(feature = "logging")]
use log::{debug, trace, warn};

use crate::channel::IsrChannel;
use crate::clock::{AtomicClockSource, ClockSource, Duration, Instant};
use crate::error::{Error, Status};
use crate::list::{self, Linked, List};
use crate::task::Task;

/// The scheduler core: a time-ordered task list plus the current/idle task
/// slots and the swappable clock source.
pub struct Scheduler {
    task_list: List<Task>,
    current_task: Option<NonNull<Task>>,
    idle_task: Option<NonNull<Task>>,
    default_idle: Task,
    clock_fn: AtomicClockSource,
}

// SAFETY: every field is either a plain value, an atomic, or a pointer this
// crate treats as caller-owned; `Scheduler` carries no thread-confined
// state of its own. Real cross-context safety still depends on using it
// the way `crate::global` does (main-context-only, with the ISR channel
// held outside any lock on this type).
unsafe impl Send for Scheduler {}

impl Scheduler {
    /// A fresh, uninitialized scheduler. Call [`Scheduler::init`] exactly
    /// once, from main context, before any other method — and do not move
    /// this value after that call (see [`List`]'s "Pinning" note; the same
    /// constraint applies here for the same reason: the default idle task
    /// and the task list's sentinel both self-reference this value's
    /// address once initialized).
    pub const fn new(clock_fn: ClockSource) -> Self {
        Scheduler {
            task_list: List::new(),
            current_task: None,
            idle_task: None,
            default_idle: Task::noop(Some("idle")),
            clock_fn: AtomicClockSource::new(clock_fn),
        }
    }

    /// Initialize all state: the task list's sentinel, and the default
    /// idle task slot. Not interrupt-safe. Must be called once before any
    /// other operation.
    pub fn init(&mut self) {
        self.task_list.init();
        self.idle_task = Some(NonNull::from(&mut self.default_idle));
        #[cfg(feature = "logging")]
        debug!("scheduler initialized");
    }

    fn idle(&self) -> NonNull<Task> {
        self.idle_task.expect("Scheduler::init must run before use")
    }

    fn insert_sorted(&mut self, task: NonNull<Task>) {
        // SAFETY: `task` is detached (callers unlink before calling this)
        // and points at a live `Task` the caller guarantees outlives its
        // list membership.
        let deadline = unsafe { task.as_ref().get_time() };
        let at = self.task_list.traverse(|link| {
            let candidate = unsafe { Task::container_of(link) };
            if deadline.precedes(unsafe { candidate.as_ref().get_time() }) {
                Some(link)
            } else {
                None
            }
        });
        let link = Task::link_of(task);
        match at {
            // SAFETY: `at` came from this same list's traversal; `link` is
            // detached.
            Some(at) => unsafe { self.task_list.insert_before(at, link) },
            None => unsafe { self.task_list.push_back(link) },
        }
    }

    /// Detach all scheduled tasks, clear the ISR channel, and clear
    /// `current_task`. Idempotent. Not interrupt-safe.
    pub fn reset<const Q: usize>(&mut self, isr: &IsrChannel<Q>) {
        while self.task_list.pop_front().is_some() {}
        isr.reset();
        self.current_task = None;
        #[cfg(feature = "logging")]
        debug!("scheduler reset");
    }

    /// One iteration of the main loop: drain the ISR channel into the
    /// ordered list, then either pop and run the earliest ready task or run
    /// the idle task. Must not be called reentrantly (e.g. from within a
    /// running task's callable).
    pub fn step<const Q: usize>(&mut self, isr: &IsrChannel<Q>) {
        #[cfg(debug_assertions)]
        debug_assert!(self.current_task.is_none(), "Scheduler::step called reentrantly");

        let now = self.clock_fn.now();

        while let Some(task) = isr.get() {
            // SAFETY: `task` was enqueued by a `submit_isr_*` call, which
            // never unlinks (it cannot safely touch the shared list from
            // ISR context) — so dedup happens here, on the same unlink
            // path every main-context submission goes through.
            unsafe { list::unlink(Task::link_of(task)) };
            self.insert_sorted(task);
            #[cfg(feature = "logging")]
            trace!("drained ISR submission into task list");
        }

        let chosen = match self.task_list.peek_front() {
            Some(link) => {
                // SAFETY: `link` is the head of `task_list`, a live,
                // linked `Task`.
                let candidate = unsafe { Task::container_of(link) };
                let deadline = unsafe { candidate.as_ref().get_time() };
                if !deadline.follows(now) {
                    self.task_list.pop_front();
                    candidate
                } else {
                    self.idle()
                }
            }
            None => self.idle(),
        };

        self.current_task = Some(chosen);
        #[cfg(not(feature = "profiling"))]
        unsafe {
            (*chosen.as_ptr()).call(core::ptr::null_mut());
        }
        #[cfg(feature = "profiling")]
        unsafe {
            (*chosen.as_ptr()).call(core::ptr::null_mut(), self.clock_fn.get());
        }
        self.current_task = None;
    }

    /// Submit `task` at absolute deadline `t`. If `task` is already linked
    /// (anywhere), it is unlinked first — submission is idempotent, and
    /// calling this twice with the same `(task, t)` has the same effect as
    /// calling it once.
    pub fn submit_at(&mut self, task: NonNull<Task>, t: Instant) -> Result<(), Error> {
        // SAFETY: `task` points at a live `Task`; unlinking an already
        // detached node is a documented no-op.
        unsafe {
            list::unlink(Task::link_of(task));
            (*task.as_ptr()).set_time(t);
        }
        self.insert_sorted(task);
        Ok(())
    }

    /// Submit `task` to run after `d` ticks from now.
    pub fn submit_in(&mut self, task: NonNull<Task>, d: Duration) -> Result<(), Error> {
        let now = self.clock_fn.now();
        self.submit_at(task, now.offset(d))
    }

    /// Submit `task` to run as soon as possible (deadline = now).
    pub fn submit_now(&mut self, task: NonNull<Task>) -> Result<(), Error> {
        let now = self.clock_fn.now();
        self.submit_at(task, now)
    }

    fn reschedule_at(&mut self, t: Instant) -> Result<(), Error> {
        let cur = self.current_task.ok_or(Error::NotFound)?;
        // SAFETY: `cur` is the currently-executing task, guaranteed live
        // for the duration of its own `call()`.
        unsafe { (*cur.as_ptr()).set_time(t) };
        self.insert_sorted(cur);
        Ok(())
    }

    /// Reschedule `current_task` to run again immediately (deadline = now).
    /// `NotFound` if called with no current task.
    pub fn reschedule_now(&mut self) -> Result<(), Error> {
        let now = self.clock_fn.now();
        self.reschedule_at(now)
    }

    /// Reschedule `current_task` at `current_task.get_time() + d` — drift
    /// free: relative to the task's own last *intended* deadline, not to
    /// the wall clock at the moment of the call. A task that calls
    /// `reschedule_in(100)` every run lands on deadlines `t0, t0+100,
    /// t0+200, ...` regardless of how late each run actually starts.
    /// `NotFound` if called with no current task.
    pub fn reschedule_in(&mut self, d: Duration) -> Result<(), Error> {
        let cur = self.current_task.ok_or(Error::NotFound)?;
        // SAFETY: see `reschedule_at`.
        let new_deadline = unsafe { cur.as_ref().get_time() }.offset(d);
        self.reschedule_at(new_deadline)
    }

    /// Interrupt-context submission at an absolute deadline. Stamps the
    /// deadline, then enqueues onto `isr` — never touches the main task
    /// list, and never blocks.
    ///
    /// # Interrupt safety
    /// Safe to call from interrupt context; see the module-level docs for
    /// why this only touches atomic-safe state and the externally-owned
    /// channel.
    pub fn submit_isr_at<const Q: usize>(
        &self,
        isr: &IsrChannel<Q>,
        task: NonNull<Task>,
        t: Instant,
    ) -> Result<(), Error> {
        // SAFETY: `task` points at a live `Task` the caller guarantees
        // outlives this submission's round trip through `isr`.
        let result = unsafe {
            (*task.as_ptr()).set_time(t);
            isr.put(task)
        };
        #[cfg(feature = "logging")]
        if result.is_err() {
            warn!("ISR submission dropped: channel full");
        }
        result
    }

    /// Interrupt-context submission after `d` ticks from now.
    pub fn submit_isr_in<const Q: usize>(
        &self,
        isr: &IsrChannel<Q>,
        task: NonNull<Task>,
        d: Duration,
    ) -> Result<(), Error> {
        let now = self.clock_fn.now();
        self.submit_isr_at(isr, task, now.offset(d))
    }

    /// Interrupt-context submission stamped with the ISR's current time.
    pub fn submit_isr_now<const Q: usize>(
        &self,
        isr: &IsrChannel<Q>,
        task: NonNull<Task>,
    ) -> Result<(), Error> {
        let now = self.clock_fn.now();
        self.submit_isr_at(isr, task, now)
    }

    /// Unlink `task` if it is currently scheduled. `NotFound` if it was
    /// already idle (detached and not the current task).
    pub fn remove(&mut self, task: NonNull<Task>) -> Result<NonNull<Task>, Error> {
        // SAFETY: `task` points at a live `Task`.
        if unsafe { task.as_ref().is_scheduled() } {
            unsafe { list::unlink(Task::link_of(task)) };
            Ok(task)
        } else {
            Err(Error::NotFound)
        }
    }

    /// Where `task` sits in its lifecycle right now.
    pub fn status(&self, task: NonNull<Task>) -> Status {
        if self.current_task == Some(task) {
            return Status::Active;
        }
        // SAFETY: `task` points at a live `Task`.
        if unsafe { task.as_ref().is_scheduled() } {
            let now = self.clock_fn.now();
            let deadline = unsafe { task.as_ref().get_time() };
            if deadline.follows(now) {
                Status::Scheduled
            } else {
                Status::Runnable
            }
        } else {
            Status::Idle
        }
    }

    /// The task currently executing, if any.
    pub fn get_current_task(&self) -> Option<NonNull<Task>> {
        self.current_task
    }

    /// The earliest-deadline task without removing it from the list.
    pub fn get_next_task(&self) -> Option<NonNull<Task>> {
        self.task_list.peek_front().map(|link| unsafe { Task::container_of(link) })
    }

    /// True iff no task is linked into the list (the idle task may still
    /// run via `step`; this only reflects the ordered list).
    pub fn is_empty(&self) -> bool {
        self.task_list.is_empty()
    }

    /// Number of tasks currently linked into the list.
    pub fn task_count(&self) -> usize {
        self.task_list.len()
    }

    /// Install a new idle task, returning the one it replaces. The caller
    /// retains ownership of both.
    pub fn set_idle_task(&mut self, idle: NonNull<Task>) -> NonNull<Task> {
        self.idle_task.replace(idle).expect("Scheduler::init must run before use")
    }

    /// The task that runs when no ordinary task is ready.
    pub fn get_idle_task(&self) -> NonNull<Task> {
        self.idle()
    }

    /// Swap the clock source. Swapping concurrently with `step()` is
    /// undefined behavior; only do this before the scheduler starts
    /// running, or while certain that no task is mid-callable.
    pub fn set_clock_source(&mut self, f: ClockSource) {
        self.clock_fn.set(f);
    }

    /// The currently installed clock source.
    pub fn get_clock_source(&self) -> ClockSource {
        self.clock_fn.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ffi::c_void;
    use core::sync::atomic::{AtomicU64, Ordering};

    static VCLOCK: AtomicU64 = AtomicU64::new(0);

    fn virtual_now() -> Instant {
        Instant::from_ticks(VCLOCK.load(Ordering::Relaxed))
    }

    fn set_clock(t: u64) {
        VCLOCK.store(t, Ordering::Relaxed);
    }

    fn noop(_ctx: *mut c_void, _arg: *mut c_void) {}

    fn fresh() -> Scheduler {
        set_clock(0);
        let mut s = Scheduler::new(virtual_now);
        s.init();
        s
    }

    #[test]
    fn step_on_empty_list_runs_idle() {
        static RAN: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);
        fn idle_fn(_ctx: *mut c_void, _arg: *mut c_void) {
            RAN.store(true, Ordering::Relaxed);
        }
        let mut s = fresh();
        let mut idle = Task::new(idle_fn, core::ptr::null_mut(), Some("custom-idle"));
        s.set_idle_task(NonNull::from(&mut idle));
        let isr: IsrChannel<4> = IsrChannel::new();
        s.step(&isr);
        assert!(RAN.load(Ordering::Relaxed));
        assert!(s.get_current_task().is_none());
    }

    // Each callable records its identity into the next free slot of a
    // run-order buffer, indexed by a counter — avoids needing per-closure
    // captured state (this crate has no allocator, so no `Box<dyn FnMut>`).
    // Statics are dedicated per test (not shared) since cargo runs tests in
    // parallel by default.
    static ORDER_SEQ: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);
    static ORDER_BUF: [core::sync::atomic::AtomicU8; 2] =
        [core::sync::atomic::AtomicU8::new(0), core::sync::atomic::AtomicU8::new(0)];

    fn order_run_a(_ctx: *mut c_void, _arg: *mut c_void) {
        let i = ORDER_SEQ.fetch_add(1, Ordering::Relaxed);
        ORDER_BUF[i].store(b'A', Ordering::Relaxed);
    }
    fn order_run_b(_ctx: *mut c_void, _arg: *mut c_void) {
        let i = ORDER_SEQ.fetch_add(1, Ordering::Relaxed);
        ORDER_BUF[i].store(b'B', Ordering::Relaxed);
    }

    #[test]
    fn earlier_deadline_runs_first() {
        let mut s = fresh();
        let isr: IsrChannel<4> = IsrChannel::new();

        let mut a = Task::new(order_run_a, core::ptr::null_mut(), Some("A"));
        let mut b = Task::new(order_run_b, core::ptr::null_mut(), Some("B"));

        s.submit_at(NonNull::from(&mut a), Instant::from_ticks(10)).unwrap();
        s.submit_at(NonNull::from(&mut b), Instant::from_ticks(5)).unwrap();

        set_clock(5);
        s.step(&isr);
        assert_eq!(s.task_count(), 1);

        set_clock(10);
        s.step(&isr);
        assert_eq!(s.task_count(), 0);

        assert_eq!(
            [ORDER_BUF[0].load(Ordering::Relaxed), ORDER_BUF[1].load(Ordering::Relaxed)],
            [b'B', b'A']
        );
    }

    static FIFO_SEQ: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);
    static FIFO_BUF: [core::sync::atomic::AtomicU8; 3] = [
        core::sync::atomic::AtomicU8::new(0),
        core::sync::atomic::AtomicU8::new(0),
        core::sync::atomic::AtomicU8::new(0),
    ];

    fn fifo_run(tag: u8) {
        let i = FIFO_SEQ.fetch_add(1, Ordering::Relaxed);
        FIFO_BUF[i].store(tag, Ordering::Relaxed);
    }
    fn fifo_run_a(_ctx: *mut c_void, _arg: *mut c_void) {
        fifo_run(b'A');
    }
    fn fifo_run_b(_ctx: *mut c_void, _arg: *mut c_void) {
        fifo_run(b'B');
    }
    fn fifo_run_c(_ctx: *mut c_void, _arg: *mut c_void) {
        fifo_run(b'C');
    }

    #[test]
    fn equal_deadlines_run_fifo() {
        let mut s = fresh();
        let isr: IsrChannel<4> = IsrChannel::new();

        let mut a = Task::new(fifo_run_a, core::ptr::null_mut(), Some("A"));
        let mut b = Task::new(fifo_run_b, core::ptr::null_mut(), Some("B"));
        let mut c = Task::new(fifo_run_c, core::ptr::null_mut(), Some("C"));

        set_clock(5);
        s.submit_at(NonNull::from(&mut a), Instant::from_ticks(5)).unwrap();
        s.submit_at(NonNull::from(&mut b), Instant::from_ticks(5)).unwrap();
        s.submit_at(NonNull::from(&mut c), Instant::from_ticks(5)).unwrap();

        s.step(&isr);
        s.step(&isr);
        s.step(&isr);

        let seen = [
            FIFO_BUF[0].load(Ordering::Relaxed),
            FIFO_BUF[1].load(Ordering::Relaxed),
            FIFO_BUF[2].load(Ordering::Relaxed),
        ];
        assert_eq!(seen, [b'A', b'B', b'C']);
    }

    #[test]
    fn submission_is_idempotent() {
        let mut s = fresh();
        let mut a = Task::new(noop, core::ptr::null_mut(), Some("A"));
        let p = NonNull::from(&mut a);
        s.submit_at(p, Instant::from_ticks(10)).unwrap();
        s.submit_at(p, Instant::from_ticks(10)).unwrap();
        assert_eq!(s.task_count(), 1);
    }

    #[test]
    fn resubmitting_at_new_deadline_moves_it() {
        let mut s = fresh();
        let mut a = Task::new(noop, core::ptr::null_mut(), Some("A"));
        let mut b = Task::new(noop, core::ptr::null_mut(), Some("B"));
        s.submit_at(NonNull::from(&mut a), Instant::from_ticks(10)).unwrap();
        s.submit_at(NonNull::from(&mut b), Instant::from_ticks(20)).unwrap();
        // Move `a` to run after `b`.
        s.submit_at(NonNull::from(&mut a), Instant::from_ticks(30)).unwrap();
        let head = s.get_next_task().unwrap();
        assert!(core::ptr::eq(head.as_ptr(), &b as *const _ as *mut _));
    }

    #[test]
    fn remove_cancels_pending_task() {
        let mut s = fresh();
        let isr: IsrChannel<4> = IsrChannel::new();
        let mut a = Task::new(noop, core::ptr::null_mut(), Some("A"));
        let p = NonNull::from(&mut a);
        s.submit_at(p, Instant::from_ticks(20)).unwrap();
        s.remove(p).unwrap();
        set_clock(30);
        s.step(&isr);
        assert!(!unsafe { p.as_ref().is_scheduled() });
        assert_eq!(s.status(p), Status::Idle);
    }

    #[test]
    fn remove_on_idle_task_is_not_found() {
        let mut s = fresh();
        let mut a = Task::new(noop, core::ptr::null_mut(), Some("A"));
        let p = NonNull::from(&mut a);
        assert_eq!(s.remove(p), Err(Error::NotFound));
    }

    static DRIFT_TICKS: [AtomicU64; 4] = [
        AtomicU64::new(0),
        AtomicU64::new(0),
        AtomicU64::new(0),
        AtomicU64::new(0),
    ];
    static DRIFT_RUN_IDX: core::sync::atomic::AtomicUsize =
        core::sync::atomic::AtomicUsize::new(0);
    static DRIFT_SCHED: core::sync::atomic::AtomicPtr<Scheduler> =
        core::sync::atomic::AtomicPtr::new(core::ptr::null_mut());

    // `ctx` carries the scheduler pointer instead of a captured static, so
    // the callable can reach `reschedule_in` on itself — this is exactly
    // what `ctx: *mut c_void` is for (see `Task::new`'s docs).
    fn periodic_reschedule(ctx: *mut c_void, _arg: *mut c_void) {
        let sched = unsafe { &mut *(ctx as *mut Scheduler) };
        let i = DRIFT_RUN_IDX.fetch_add(1, Ordering::Relaxed);
        let cur = sched.get_current_task().unwrap();
        let deadline = unsafe { cur.as_ref().get_time() };
        DRIFT_TICKS[i].store(deadline.ticks(), Ordering::Relaxed);
        sched.reschedule_in(100).unwrap();
    }

    #[test]
    fn reschedule_in_is_drift_free() {
        DRIFT_RUN_IDX.store(0, Ordering::Relaxed);
        for slot in &DRIFT_TICKS {
            slot.store(0, Ordering::Relaxed);
        }

        let mut s = fresh();
        let isr: IsrChannel<4> = IsrChannel::new();
        DRIFT_SCHED.store(&mut s as *mut Scheduler, Ordering::Relaxed);

        let sched_ptr = DRIFT_SCHED.load(Ordering::Relaxed) as *mut c_void;
        let mut p = Task::new(periodic_reschedule, sched_ptr, Some("P"));
        s.submit_at(NonNull::from(&mut p), Instant::from_ticks(0)).unwrap();

        // Each run fires late relative to its intended deadline (97 instead
        // of 0, 201 instead of 100, ...); `reschedule_in(100)` must still
        // land each successive deadline exactly 100 ticks after the last,
        // not 100 ticks after the late fire time.
        for &tick in &[97u64, 201, 305, 409] {
            set_clock(tick);
            s.step(&isr);
        }

        let seen = [
            DRIFT_TICKS[0].load(Ordering::Relaxed),
            DRIFT_TICKS[1].load(Ordering::Relaxed),
            DRIFT_TICKS[2].load(Ordering::Relaxed),
            DRIFT_TICKS[3].load(Ordering::Relaxed),
        ];
        assert_eq!(seen, [0, 100, 200, 300]);
    }
}
