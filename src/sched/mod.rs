/*
 * Scheduler Core
 *
 * `Kernel` is the single coarse-grained state store the rest of this
 * crate operates on: the thread arena, the lock/semaphore/condvar
 * arenas (added by `impl Kernel` blocks in `sync::lock`,
 * `sync::semaphore`, `sync::condvar`), the active ready-queue policy,
 * and the tick counter. Spec §5 is explicit that this state is "guarded
 * by blanket interrupt disabling rather than fine-grained locks" — so
 * rather than one `spin::Mutex` per object (which would need a lock
 * ordering discipline to avoid deadlock when donation walks from a lock
 * to a semaphore to another lock), there is exactly one `spin::Mutex`
 * around one `Kernel`, entered through [`with_kernel`]. Call sites pair
 * that with an [`crate::intr::InterruptGuard`] for the critical-section
 * semantics the spec describes.
 */

pub mod mlfqs;
pub mod policy;
pub mod ps;
pub mod thread;

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::config::{self, SchedulerKind};
use crate::error::KernelError;
use crate::fixed_point::Fixed;
use crate::intr;
use crate::list::OrderedQueue;
use crate::{kassert, kbug};

use self::mlfqs::MlfqsScheduler;
use self::policy::{PolicyCtx, SchedPolicy};
use self::ps::PriorityScheduler;
pub use self::thread::{CondvarId, LockId, SemaphoreId, Thread, ThreadId, ThreadState, WaitTarget};

/// Snapshot of a thread's scheduling-relevant fields, returned by
/// [`get_by_id`] so callers don't need a reference into the locked
/// arena.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub base_priority: i32,
    pub current_priority: i32,
    pub niceness: i32,
    pub recent_cpu: Fixed,
}

struct ThreadsCtx<'a> {
    threads: &'a [Option<Thread>],
}

impl PolicyCtx for ThreadsCtx<'_> {
    fn priority_of(&self, tid: ThreadId) -> Option<i32> {
        self.threads.get(tid.0)?.as_ref().map(|t| t.current_priority)
    }

    fn ready_threads(&self) -> Vec<ThreadId> {
        self.threads
            .iter()
            .flatten()
            .filter(|t| t.state == ThreadState::Ready)
            .map(|t| t.id)
            .collect()
    }
}

pub(crate) struct Kernel {
    pub(crate) threads: Vec<Option<Thread>>,
    pub(crate) locks: Vec<Option<super::sync::lock::LockState>>,
    pub(crate) semaphores: Vec<Option<super::sync::semaphore::SemaphoreState>>,
    pub(crate) condvars: Vec<Option<super::sync::condvar::CondvarState>>,
    policy: Box<dyn SchedPolicy>,
    kind: SchedulerKind,
    current: ThreadId,
    idle: ThreadId,
    ticks: u64,
    load_avg: Fixed,
    sleepers: OrderedQueue<(ThreadId, u64)>,
}

lazy_static! {
    static ref KERNEL: Mutex<Option<Kernel>> = Mutex::new(None);
}

/// Run `f` with exclusive access to the kernel state. Panics (fail-stop,
/// via [`kbug!`]) if [`init`] has not been called yet — every other
/// operation in this crate is a programming error before boot chooses a
/// policy.
pub(crate) fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    let mut guard = KERNEL.lock();
    match guard.as_mut() {
        Some(kernel) => f(kernel),
        None => kbug!("scheduler core used before sched::init"),
    }
}

/// Boot-time policy selection (spec §6: "a configuration switch
/// selecting the scheduler at boot"). Creates the idle thread (id 0,
/// `PRI_MIN`) as the thread that runs when nothing else is READY.
/// Idempotent-unsafe by design: calling this twice would silently
/// discard all existing thread state, so it is a contract violation,
/// not a recoverable case.
pub fn init(kind: SchedulerKind) {
    let mut guard = KERNEL.lock();
    kassert!(guard.is_none(), "sched::init called more than once");

    let policy: Box<dyn SchedPolicy> = match kind {
        SchedulerKind::Priority => Box::new(PriorityScheduler::new()),
        SchedulerKind::Mlfqs => Box::new(MlfqsScheduler::new()),
    };

    let idle = Thread::new(ThreadId(0), "idle".to_string(), config::PRI_MIN, None);
    let mut threads = Vec::with_capacity(config::MAX_THREADS);
    threads.push(Some(idle));

    log::info!("scheduler core booting with policy {:?}", kind);

    *guard = Some(Kernel {
        threads,
        locks: Vec::new(),
        semaphores: Vec::new(),
        condvars: Vec::new(),
        policy,
        kind,
        current: ThreadId(0),
        idle: ThreadId(0),
        ticks: 0,
        load_avg: Fixed::ZERO,
        sleepers: OrderedQueue::new(),
    });
}

impl Kernel {
    fn ctx(&self) -> ThreadsCtx<'_> {
        ThreadsCtx {
            threads: &self.threads,
        }
    }

    pub(crate) fn thread(&self, tid: ThreadId) -> &Thread {
        match self.threads.get(tid.0).and_then(|t| t.as_ref()) {
            Some(t) => t,
            None => kbug!("reference to nonexistent thread {}", tid),
        }
    }

    pub(crate) fn thread_mut(&mut self, tid: ThreadId) -> &mut Thread {
        match self.threads.get_mut(tid.0).and_then(|t| t.as_mut()) {
            Some(t) => t,
            None => kbug!("reference to nonexistent thread {}", tid),
        }
    }

    pub(crate) fn current(&self) -> ThreadId {
        self.current
    }

    pub(crate) fn donates(&self) -> bool {
        self.policy.donates()
    }

    /// Insert `tid` into the active policy's ready structure, updating
    /// its state to READY first.
    fn admit_ready(&mut self, tid: ThreadId) {
        self.thread_mut(tid).state = ThreadState::Ready;
        let ctx = self.ctx();
        self.policy.on_ready(&ctx, tid);
    }

    /// Notify the active policy that `tid`'s priority changed from
    /// `old_priority`, so it can reorder its ready structure (a no-op if
    /// `tid` isn't READY). Callers must update `current_priority` before
    /// calling this, since the policy reads the new value via `ctx`.
    pub(crate) fn notify_priority_changed(&mut self, tid: ThreadId, old_priority: i32) {
        let ctx = self.ctx();
        self.policy.on_priority_changed(&ctx, tid, old_priority);
    }

    /// True if some READY thread currently outranks `tid`.
    pub(crate) fn outranked(&self, tid: ThreadId) -> bool {
        let ctx = self.ctx();
        self.policy.has_higher_priority_ready(&ctx, tid)
    }

    /// Pick the next thread to run and make it current, re-admitting
    /// the previously running thread (unless it is BLOCKED or DYING).
    /// Reaps the outgoing thread's TCB first if it entered DYING since
    /// the last schedule (spec §3: "TCBs are reaped at the next schedule
    /// after entering DYING"). This crate owns only the scheduling
    /// *decision*; the register save/restore that would make this a
    /// real context switch belongs to the embedding kernel's
    /// architecture layer, outside this component's scope.
    fn schedule(&mut self) {
        let previous = self.current;
        if previous != self.idle && self.thread(previous).state == ThreadState::Dying {
            self.reap(previous);
        }

        let ctx = self.ctx();
        let next = self.policy.pick_next(&ctx).unwrap_or(self.idle);
        self.thread_mut(next).state = ThreadState::Running;
        self.current = next;
    }

    /// Free a DYING thread's TCB slot so `create` can reuse it. Callers
    /// holding a stale `ThreadId` for this slot (a lock's `holder`, a
    /// waiter list) would be a programming error by this point: the
    /// spec requires a thread to release every lock it holds before
    /// exiting, and nothing still blocks on a thread rather than on a
    /// lock/semaphore/condvar it owned.
    fn reap(&mut self, tid: ThreadId) {
        log::debug!("{} reaped", tid);
        self.threads[tid.0] = None;
    }

    fn create(&mut self, name: &str, base_priority: i32) -> Result<ThreadId, KernelError> {
        let reused = self.threads.iter().position(|t| t.is_none());
        let tid = match reused {
            Some(idx) => ThreadId(idx),
            None => {
                if self.threads.len() >= config::MAX_THREADS {
                    return Err(KernelError::ThreadAllocationFailed);
                }
                ThreadId(self.threads.len())
            }
        };

        let thread = Thread::new(tid, name.to_string(), base_priority, Some(self.current));
        match reused {
            Some(idx) => self.threads[idx] = Some(thread),
            None => self.threads.push(Some(thread)),
        }

        // Under MLFQS, priority is a function of niceness and recent_cpu
        // (spec §3, §4.5), never the caller-supplied `base_priority` —
        // a fresh thread has recent_cpu = 0 and nice = 0, so it belongs
        // at `mlfqs::recompute_priority(0, 0)` (PRI_MAX), not wherever
        // `base_priority` happened to land it.
        if self.kind == SchedulerKind::Mlfqs {
            let mlfqs_priority =
                mlfqs::recompute_priority(self.thread(tid).recent_cpu, self.thread(tid).niceness);
            self.thread_mut(tid).base_priority = mlfqs_priority;
            self.thread_mut(tid).current_priority = mlfqs_priority;
        }

        self.admit_ready(tid);
        log::debug!(
            "created {} '{}' at priority {}",
            tid,
            name,
            self.thread(tid).current_priority
        );

        if self.outranked(self.current) {
            self.yield_now();
        }
        Ok(tid)
    }

    pub(crate) fn block(&mut self) {
        kassert!(
            intr::get_level() == intr::IntrLevel::Disabled,
            "block() called with interrupts enabled"
        );
        kassert!(!intr::in_handler(), "block() called from interrupt context");
        let current = self.current;
        self.thread_mut(current).state = ThreadState::Blocked;
        self.schedule();
    }

    pub(crate) fn unblock(&mut self, tid: ThreadId) {
        kassert!(
            self.thread(tid).state == ThreadState::Blocked,
            "unblock() of a thread that is not BLOCKED"
        );
        self.admit_ready(tid);
    }

    pub(crate) fn yield_now(&mut self) {
        let current = self.current;
        if current != self.idle {
            self.admit_ready(current);
        }
        self.schedule();
    }

    fn exit(&mut self) {
        let current = self.current;
        kassert!(current != self.idle, "the idle thread cannot exit");
        log::debug!("{} exiting", current);
        self.thread_mut(current).state = ThreadState::Dying;
        self.schedule();
    }

    fn get_priority(&self, tid: ThreadId) -> i32 {
        self.thread(tid).base_priority
    }

    fn current_priority(&self, tid: ThreadId) -> i32 {
        self.thread(tid).current_priority
    }

    fn set_priority(&mut self, tid: ThreadId, priority: i32) {
        let priority = config::clamp_priority(priority);
        let old_priority = self.thread(tid).current_priority;
        self.thread_mut(tid).base_priority = priority;
        self.recompute_current_priority(tid);
        self.notify_priority_changed(tid, old_priority);

        if tid == self.current && self.outranked(tid) {
            self.yield_now();
        }
    }

    fn get_nice(&self, tid: ThreadId) -> i32 {
        self.thread(tid).niceness
    }

    fn set_nice(&mut self, tid: ThreadId, nice: i32) {
        let nice = config::clamp_nice(nice);
        let old_priority = self.thread(tid).current_priority;
        self.thread_mut(tid).niceness = nice;
        let recent_cpu = self.thread(tid).recent_cpu;
        let new_priority = mlfqs::recompute_priority(recent_cpu, nice);
        self.thread_mut(tid).current_priority = new_priority;
        self.thread_mut(tid).base_priority = new_priority;
        self.notify_priority_changed(tid, old_priority);

        if tid == self.current && self.outranked(tid) {
            self.yield_now();
        }
    }

    fn sleep_until(&mut self, wake_tick: u64) {
        if wake_tick <= self.ticks {
            return;
        }
        let current = self.current;
        self.sleepers
            .insert_by_key((current, wake_tick), |&(_, t)| core::cmp::Reverse(t));
        self.block();
    }

    fn get_by_id(&self, tid: ThreadId) -> Option<ThreadSnapshot> {
        let t = self.threads.get(tid.0)?.as_ref()?;
        Some(ThreadSnapshot {
            id: t.id,
            name: t.name.clone(),
            state: t.state,
            base_priority: t.base_priority,
            current_priority: t.current_priority,
            niceness: t.niceness,
            recent_cpu: t.recent_cpu,
        })
    }

    /// Drain every sleeper whose wake tick has arrived (spec §4.1
    /// `sleep_until`: "the timer ISR drains this queue").
    fn wake_sleepers(&mut self) {
        while let Some(&(tid, wake_tick)) = self.sleepers.front() {
            if wake_tick > self.ticks {
                break;
            }
            self.sleepers.pop_front();
            self.unblock(tid);
        }
    }

    /// MLFQS bookkeeping on the 1/4/`TIMER_FREQ` tick boundaries (spec
    /// §4.5). A no-op under PS.
    fn mlfqs_tick(&mut self) {
        if self.kind != SchedulerKind::Mlfqs {
            return;
        }

        if self.current != self.idle {
            let cur = self.current;
            self.thread_mut(cur).recent_cpu = mlfqs::tick_recent_cpu(self.thread(cur).recent_cpu);
        }

        if self.ticks % config::TIME_SLICE == 0 {
            self.recompute_mlfqs_priority(self.current);
        }

        if self.ticks % config::TIMER_FREQ == 0 {
            let ready_threads = self
                .threads
                .iter()
                .flatten()
                .filter(|t| t.state == ThreadState::Ready || t.id == self.current)
                .filter(|t| t.id != self.idle)
                .count();
            self.load_avg = mlfqs::recompute_load_avg(self.load_avg, ready_threads);
            log::trace!(
                "mlfqs: tick {} load_avg recomputed with {} ready threads",
                self.ticks,
                ready_threads
            );

            let ids: Vec<ThreadId> = self.threads.iter().flatten().map(|t| t.id).collect();
            for tid in ids {
                let t = self.thread(tid);
                let updated = mlfqs::recompute_recent_cpu(t.recent_cpu, self.load_avg, t.niceness);
                self.thread_mut(tid).recent_cpu = updated;
                self.recompute_mlfqs_priority(tid);
            }
        }
    }

    fn recompute_mlfqs_priority(&mut self, tid: ThreadId) {
        if tid == self.idle {
            return;
        }
        let t = self.thread(tid);
        let old_priority = t.current_priority;
        let new_priority = mlfqs::recompute_priority(t.recent_cpu, t.niceness);
        self.thread_mut(tid).current_priority = new_priority;
        self.thread_mut(tid).base_priority = new_priority;
        self.notify_priority_changed(tid, old_priority);
    }

    /// Called once per timer interrupt (spec §6 timer contract).
    fn tick(&mut self) {
        self.ticks += 1;
        self.wake_sleepers();
        self.mlfqs_tick();

        if self.outranked(self.current) {
            if intr::in_handler() {
                intr::request_yield_on_return();
            } else {
                self.yield_now();
            }
        }
    }
}

/// The current thread's id.
pub fn current_thread_id() -> ThreadId {
    with_kernel(|k| k.current())
}

/// Create a new READY thread. Yields immediately if it now outranks the
/// caller (spec §4.1).
pub fn create(name: &str, base_priority: i32) -> Result<ThreadId, KernelError> {
    intr::without_interrupts(|| with_kernel(|k| k.create(name, base_priority)))
}

/// Block the current thread. Caller must have interrupts disabled and
/// must not be in an interrupt handler (spec §4.1, §5).
pub fn block() {
    with_kernel(|k| k.block());
}

/// Move a BLOCKED thread back to READY.
pub fn unblock(tid: ThreadId) {
    with_kernel(|k| k.unblock(tid));
}

/// Re-enqueue the current thread as READY and reschedule.
pub fn yield_now() {
    intr::without_interrupts(|| with_kernel(|k| k.yield_now()));
}

/// Mark the current thread DYING and reschedule. Unlike the classic
/// Pintos `thread_exit`, this returns: a real architecture layer
/// performing an actual context switch would never come back from the
/// reschedule inside it, but that divergence is a property of the real
/// stack switch, not of this bookkeeping-only scheduler core.
pub fn exit() {
    intr::without_interrupts(|| with_kernel(|k| k.exit()));
}

/// Read a thread's base priority.
pub fn get_priority(tid: ThreadId) -> i32 {
    with_kernel(|k| k.get_priority(tid))
}

/// Read a thread's current (possibly donated) priority.
pub fn current_priority(tid: ThreadId) -> i32 {
    with_kernel(|k| k.current_priority(tid))
}

/// Set a thread's base priority. A silent no-op under MLFQS (spec
/// §4.1: "Under MLFQS, set_priority is ignored (priority is a function
/// of niceness and recent_cpu)") rather than a contract violation —
/// unlike the other fail-stop checks in this module, the spec
/// describes this one as ordinary, expected behavior a caller is
/// allowed to trigger.
pub fn set_priority(tid: ThreadId, priority: i32) {
    intr::without_interrupts(|| {
        with_kernel(|k| {
            if k.kind != SchedulerKind::Priority {
                return;
            }
            k.set_priority(tid, priority);
        })
    });
}

/// Read a thread's niceness (MLFQS only).
pub fn get_nice(tid: ThreadId) -> i32 {
    with_kernel(|k| k.get_nice(tid))
}

/// Set a thread's niceness, immediately recomputing its priority and
/// yielding if it no longer outranks a READY thread (MLFQS only).
pub fn set_nice(tid: ThreadId, nice: i32) {
    intr::without_interrupts(|| {
        with_kernel(|k| {
            kassert!(k.kind == SchedulerKind::Mlfqs, "set_nice is MLFQS-only");
            k.set_nice(tid, nice);
        })
    });
}

/// Block the calling thread until the global tick counter reaches
/// `wake_tick`.
pub fn sleep_until(wake_tick: u64) {
    intr::without_interrupts(|| with_kernel(|k| k.sleep_until(wake_tick)));
}

/// Snapshot of a thread's scheduling state, or `None` if `tid` was never
/// allocated or has since been reaped after exiting.
pub fn get_by_id(tid: ThreadId) -> Option<ThreadSnapshot> {
    with_kernel(|k| k.get_by_id(tid))
}

/// The global tick counter.
pub fn ticks() -> u64 {
    with_kernel(|k| k.ticks)
}

/// Drive one timer tick (spec §6 timer contract: called at `TIMER_FREQ`
/// Hz by the timer device).
pub fn tick() {
    with_kernel(|k| k.tick());
}

#[cfg(test)]
pub(crate) fn reset_for_test(kind: SchedulerKind) {
    *KERNEL.lock() = None;
    init(kind);
}

/// Test-only: force `current` without going through `schedule()`. This
/// crate models scheduling *decisions*, not a real context switch (see
/// `Kernel::schedule`), so a single test call stack can't faithfully
/// replay "thread A blocks mid-call, thread B resumes, A resumes
/// later" — there's no second stack to resume onto. Donation and
/// release tests instead set up the intermediate state directly and
/// use this to control whose perspective (`self.current()`) the next
/// call runs under.
#[cfg(test)]
pub(crate) fn set_current_for_test(tid: ThreadId) {
    with_kernel(|k| k.current = tid);
}
