/*
 * Thread Control Block
 *
 * The TCB carries both the fields every policy needs (id, name, priority,
 * state) and the fields only one policy consults: the donation
 * back-references (`held_locks`, `waiting_on`) for PS, `niceness` and
 * `recent_cpu` for MLFQS. Both sets of fields live on every `Thread`
 * rather than behind a policy-specific enum variant, matching how the
 * source keeps them as plain fields on one `struct thread` — splitting
 * them out would just relocate the "only one policy reads this" comment
 * without changing anything it's safe to remove.
 */

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::config;
use crate::fixed_point::Fixed;

/// Thread identifier. Stable for the thread's lifetime; never reused
/// while any stale reference (a lock's holder, a waiter list entry)
/// could still observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Lifecycle state (spec §3 invariant 1: exactly one thread RUNNING).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Identifier for a lock, used by [`WaitTarget`] and by a thread's
/// held-locks list. Defined here (rather than in `sync::lock`) so
/// `thread` does not depend on `sync`; `sync::lock` re-exports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(pub usize);

/// Identifier for a semaphore, for the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemaphoreId(pub usize);

/// Identifier for a condition variable, for the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CondvarId(pub usize);

/// What a BLOCKED thread is waiting on, so the donation walker can
/// recurse from any donee to whatever it is itself blocked on (spec §9:
/// "tagged variant `WaitingOn`... with indices rather than raw
/// pointers"). Exactly one of these is set while BLOCKED (spec §3
/// invariant 3); `None` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    None,
    Lock(LockId),
    Semaphore(SemaphoreId),
    Condvar(CondvarId),
}

pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,

    /// Priority absent any donation.
    pub base_priority: i32,
    /// Priority possibly elevated by donation; `current_priority >=
    /// base_priority` always (spec §3 invariant 2).
    pub current_priority: i32,

    /// Locks this thread currently holds. No priority is cached here:
    /// a held lock's top-waiter priority can change at any time while
    /// this thread still holds it (a higher-priority thread arriving on
    /// it later), so `Kernel::recompute_current_priority` always reads
    /// it live off the lock's own semaphore rather than trusting a
    /// snapshot taken at acquire time.
    pub held_locks: Vec<LockId>,
    /// What this thread is blocked on, if BLOCKED.
    pub waiting_on: WaitTarget,

    /// MLFQS niceness, `[NICE_MIN, NICE_MAX]`. Ignored under PS.
    pub niceness: i32,
    /// MLFQS recent CPU usage, fixed-point. Ignored under PS.
    pub recent_cpu: Fixed,

    /// Parent thread, for diagnostics; this crate does not implement
    /// process/child-reaping semantics (out of scope, spec §1).
    pub parent: Option<ThreadId>,
}

impl Thread {
    pub fn new(id: ThreadId, name: String, base_priority: i32, parent: Option<ThreadId>) -> Self {
        let base_priority = config::clamp_priority(base_priority);
        Self {
            id,
            name,
            state: ThreadState::Ready,
            base_priority,
            current_priority: base_priority,
            held_locks: Vec::new(),
            waiting_on: WaitTarget::None,
            niceness: config::NICE_DEFAULT,
            recent_cpu: Fixed::ZERO,
            parent,
        }
    }

    /// Record that this thread now holds `lock` (on a successful
    /// acquire). The actual donor-priority bookkeeping is computed live
    /// by `Kernel::recompute_current_priority`, not cached here.
    pub fn note_held_lock(&mut self, lock: LockId) {
        if !self.held_locks.contains(&lock) {
            self.held_locks.push(lock);
        }
    }

    /// Remove `lock` from `held_locks` (on release).
    pub fn forget_held_lock(&mut self, lock: LockId) {
        self.held_locks.retain(|&l| l != lock);
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("base_priority", &self.base_priority)
            .field("current_priority", &self.current_priority)
            .field("waiting_on", &self.waiting_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_thread_has_no_donation() {
        let t = Thread::new(ThreadId(1), "alice".into(), 20, None);
        assert_eq!(t.base_priority, 20);
        assert_eq!(t.current_priority, 20);
        assert!(t.held_locks.is_empty());
        assert_eq!(t.waiting_on, WaitTarget::None);
    }

    #[test]
    fn note_and_forget_held_lock_are_idempotent() {
        let mut t = Thread::new(ThreadId(1), "low".into(), 10, None);
        t.note_held_lock(LockId(0));
        t.note_held_lock(LockId(0));
        assert_eq!(t.held_locks, [LockId(0)]);

        t.forget_held_lock(LockId(0));
        assert!(t.held_locks.is_empty());
        // Forgetting a lock not held is a harmless no-op at this layer;
        // `Kernel::lock_release` is what asserts ownership.
        t.forget_held_lock(LockId(0));
        assert!(t.held_locks.is_empty());
    }

    #[test]
    fn note_held_lock_tracks_every_lock_this_thread_holds() {
        let mut t = Thread::new(ThreadId(1), "holder".into(), 5, None);
        t.note_held_lock(LockId(0));
        t.note_held_lock(LockId(1));
        t.note_held_lock(LockId(2));
        assert_eq!(t.held_locks, [LockId(0), LockId(1), LockId(2)]);
    }

    #[test]
    fn base_priority_is_clamped_at_construction() {
        let t = Thread::new(ThreadId(1), "x".into(), 1000, None);
        assert_eq!(t.base_priority, config::PRI_MAX);
    }
}
