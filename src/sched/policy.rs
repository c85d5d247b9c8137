/*
 * Scheduling Policy Interface
 *
 * Mirrors the separation the teacher draws between mechanism and policy:
 * a `SchedPolicy` implements a ready-queue discipline (PS or MLFQS)
 * without ever touching `Thread` structs directly; a `PolicyCtx` is the
 * only door back into kernel state, so a policy can be unit-tested
 * against a fake context and swapped at boot without the rest of the
 * scheduler core knowing which one is active.
 */

use alloc::vec::Vec;

use super::thread::ThreadId;

/// Kernel state access granted to a policy. Implemented by the central
/// `Kernel` in `sched::mod` over its thread arena.
pub trait PolicyCtx {
    /// Current priority of a thread, or `None` if it doesn't exist.
    fn priority_of(&self, tid: ThreadId) -> Option<i32>;

    /// All threads currently in the READY state, in no particular
    /// order — the policy is responsible for whatever order it needs.
    fn ready_threads(&self) -> Vec<ThreadId>;
}

/// A pluggable ready-queue discipline. The central scheduler calls these
/// hooks at exactly the points named; a policy owns no thread state of
/// its own beyond what it needs to order the ready set (PS needs
/// nothing extra; MLFQS needs per-thread niceness/recent_cpu, which
/// live on `Thread` itself since both policies share the TCB).
pub trait SchedPolicy: Send {
    /// A thread just became READY (newly created, unblocked, or
    /// yielded). The policy should admit it into its ready structure.
    fn on_ready(&mut self, ctx: &dyn PolicyCtx, tid: ThreadId);

    /// A thread left the READY state (selected to run, or removed
    /// because it's exiting). The policy should drop it from its ready
    /// structure if present.
    fn on_unready(&mut self, ctx: &dyn PolicyCtx, tid: ThreadId);

    /// A thread's priority changed (donation, `set_priority`, or an
    /// MLFQS recomputation) from `old_priority` to whatever
    /// `ctx.priority_of(tid)` now reports. The policy should reorder if
    /// it tracks this thread; a policy whose ready structure is
    /// partitioned by priority (MLFQS) needs `old_priority` to find
    /// which partition to move the thread out of.
    fn on_priority_changed(&mut self, ctx: &dyn PolicyCtx, tid: ThreadId, old_priority: i32);

    /// Choose the next thread to run from the policy's ready structure,
    /// removing it (the caller re-inserts the preempted thread via
    /// `on_ready` if it's still runnable). `None` means "run idle."
    fn pick_next(&mut self, ctx: &dyn PolicyCtx) -> Option<ThreadId>;

    /// True if any READY thread currently outranks `tid` under this
    /// policy's ordering — used to decide whether a priority change or
    /// a new thread should trigger a yield.
    fn has_higher_priority_ready(&self, ctx: &dyn PolicyCtx, than: ThreadId) -> bool;

    /// Whether this policy participates in priority donation. PS does;
    /// MLFQS does not (spec §4.3: "acquire/release(lock) under MLFQS:
    /// no donation").
    fn donates(&self) -> bool;

    fn name(&self) -> &'static str;
}
