/*
 * Lock and Priority Donation
 *
 * A lock is a single-owner wrapper around a semaphore initialized to 1
 * (spec §3); everything else here is the PS policy's donation protocol
 * layered on top (spec §4.3). Under MLFQS, `donates()` is false and
 * `acquire`/`release` degrade to exactly the semaphore calls spec §4.3
 * describes for that policy — no held-locks bookkeeping, no donation
 * walk.
 *
 * The donation walk (`donate_priority`) raises a donee's current
 * priority, re-sorts whichever queue it's waiting in (so the change is
 * visible to the next `up`/`signal`), and recurses through its
 * `waiting_on` only when that donee is itself blocked on another lock —
 * a semaphore or condvar waiter has no single holder to propagate
 * through, so the chain stops there (spec §9: "the wait graph is
 * acyclic... cycles would be deadlock").
 */

use alloc::vec::Vec;

use crate::config;
use crate::kassert;
use crate::sched::{
    self, CondvarId, Kernel, LockId, SemaphoreId, ThreadId, ThreadState, WaitTarget,
};

/// Lock state: who holds it, and the semaphore that actually gates
/// acquisition (spec §3).
pub(crate) struct LockState {
    pub(crate) holder: Option<ThreadId>,
    pub(crate) sema: SemaphoreId,
}

impl Kernel {
    pub(crate) fn lock(&self, id: LockId) -> &LockState {
        match self.locks.get(id.0).and_then(|l| l.as_ref()) {
            Some(l) => l,
            None => crate::kbug!("reference to nonexistent lock {:?}", id),
        }
    }

    pub(crate) fn lock_mut(&mut self, id: LockId) -> &mut LockState {
        match self.locks.get_mut(id.0).and_then(|l| l.as_mut()) {
            Some(l) => l,
            None => crate::kbug!("reference to nonexistent lock {:?}", id),
        }
    }

    pub(crate) fn lock_init(&mut self) -> LockId {
        kassert!(self.locks.len() < config::MAX_LOCKS, "lock table exhausted");
        let sema = self.sema_init(1);
        let id = LockId(self.locks.len());
        self.locks.push(Some(LockState { holder: None, sema }));
        id
    }

    fn lock_top_waiter_priority(&self, id: LockId) -> i32 {
        let sema = self.lock(id).sema;
        self.semaphore(sema)
            .waiters
            .front()
            .map(|&t| self.thread(t).current_priority)
            .unwrap_or(config::PRI_MIN)
    }

    /// Recompute `tid`'s current priority as `max(base, top waiter
    /// priority of every lock it holds)`, reading each held lock's
    /// waiter queue live rather than trusting a cached snapshot — a
    /// lock's top waiter can change at any time while `tid` still holds
    /// it (`donate_priority` raises a waiter's priority without
    /// visiting the holder's other locks), so only a live read reflects
    /// every still-active donation (spec §9, matching `synch.c`'s
    /// `get_lock_priority` / `thread_recompute_priority`).
    pub(crate) fn recompute_current_priority(&mut self, tid: ThreadId) {
        let base = self.thread(tid).base_priority;
        let held: Vec<LockId> = self.thread(tid).held_locks.clone();
        let donor = held
            .iter()
            .map(|&l| self.lock_top_waiter_priority(l))
            .max()
            .unwrap_or(config::PRI_MIN);
        self.thread_mut(tid).current_priority = base.max(donor);
    }

    pub(crate) fn lock_acquire(&mut self, id: LockId) {
        let current = self.current();
        kassert!(
            self.lock(id).holder != Some(current),
            "thread attempted to re-acquire a lock it already holds"
        );

        self.thread_mut(current).waiting_on = WaitTarget::Lock(id);
        if self.donates() {
            self.donate_priority(id);
        }

        let sema = self.lock(id).sema;
        self.sema_down_marked(sema, WaitTarget::Lock(id));
        self.thread_mut(current).waiting_on = WaitTarget::None;

        self.lock_mut(id).holder = Some(current);
        if self.donates() {
            self.thread_mut(current).note_held_lock(id);
        }
    }

    /// Non-blocking acquire attempt. Bypasses donation entirely: a
    /// caller that never blocks has nothing to donate through (spec §9:
    /// "`lock_try_acquire` bypasses donation entirely").
    pub(crate) fn lock_try_acquire(&mut self, id: LockId) -> bool {
        let current = self.current();
        kassert!(
            self.lock(id).holder != Some(current),
            "thread attempted to re-acquire a lock it already holds"
        );

        let sema = self.lock(id).sema;
        if !self.sema_try_down(sema) {
            return false;
        }
        self.lock_mut(id).holder = Some(current);
        if self.donates() {
            self.thread_mut(current).note_held_lock(id);
        }
        true
    }

    pub(crate) fn lock_release(&mut self, id: LockId) {
        let current = self.current();
        kassert!(
            self.lock(id).holder == Some(current),
            "thread released a lock it does not hold"
        );

        if self.donates() {
            let old_priority = self.thread(current).current_priority;
            self.thread_mut(current).forget_held_lock(id);
            self.recompute_current_priority(current);
            self.notify_priority_changed(current, old_priority);
        }

        self.lock_mut(id).holder = None;
        let sema = self.lock(id).sema;
        self.sema_up(sema);
    }

    /// Raise the priority of everyone transitively blocked on a lock
    /// `id`'s holder holds, starting from that holder (spec §4.3 step
    /// 3). Terminates at a running/ready thread, a donee already at or
    /// above the requester's priority, or a donee blocked on a
    /// semaphore/condvar rather than another lock.
    fn donate_priority(&mut self, id: LockId) {
        let donor_priority = self.thread(self.current()).current_priority;
        let mut donee = self.lock(id).holder;

        while let Some(tid) = donee {
            let old_priority = self.thread(tid).current_priority;
            if old_priority >= donor_priority {
                break;
            }
            log::debug!(
                "donating priority {} from {} to {} via {:?}",
                donor_priority,
                self.current(),
                tid,
                id
            );
            self.thread_mut(tid).current_priority = donor_priority;

            match self.thread(tid).state {
                ThreadState::Running => break,
                ThreadState::Ready => {
                    self.notify_priority_changed(tid, old_priority);
                    break;
                }
                _ => {}
            }

            donee = match self.thread(tid).waiting_on {
                WaitTarget::Lock(l) => {
                    self.resort_semaphore_waiters(self.lock(l).sema);
                    self.lock(l).holder
                }
                WaitTarget::Semaphore(s) => {
                    self.resort_semaphore_waiters(s);
                    None
                }
                WaitTarget::Condvar(c) => {
                    self.resort_condvar_waiters(c);
                    None
                }
                WaitTarget::None => None,
            };
        }
    }

    /// Re-sort a semaphore's waiter queue by current priority,
    /// descending. Used when a donation changes a waiter's key
    /// mid-wait (spec §4.3: "re-sort any waiter queue in which the
    /// donee is enqueued").
    pub(crate) fn resort_semaphore_waiters(&mut self, id: SemaphoreId) {
        let threads = &self.threads;
        let sema = match self.semaphores.get_mut(id.0).and_then(|s| s.as_mut()) {
            Some(s) => s,
            None => crate::kbug!("reference to nonexistent semaphore {:?}", id),
        };
        sema.waiters.sort_by_key(|&t| {
            threads
                .get(t.0)
                .and_then(|o| o.as_ref())
                .map(|th| th.current_priority)
                .unwrap_or(config::PRI_MIN)
        });
    }

    /// Re-sort a condvar's waiter list by the top-waiter-priority of
    /// each record's private semaphore (spec §4.4).
    pub(crate) fn resort_condvar_waiters(&mut self, id: CondvarId) {
        let threads = &self.threads;
        let semaphores = &self.semaphores;
        let cv = match self.condvars.get_mut(id.0).and_then(|c| c.as_mut()) {
            Some(c) => c,
            None => crate::kbug!("reference to nonexistent condvar {:?}", id),
        };
        cv.waiters.sort_by_key(|w| {
            semaphores
                .get(w.sema.0)
                .and_then(|s| s.as_ref())
                .and_then(|s| s.waiters.front())
                .and_then(|&t| threads.get(t.0).and_then(|o| o.as_ref()))
                .map(|th| th.current_priority)
                .unwrap_or(config::PRI_MIN)
        });
    }
}

/// Allocate a new, unheld lock.
pub fn init() -> LockId {
    crate::intr::without_interrupts(|| sched::with_kernel(|k| k.lock_init()))
}

/// Acquire `id`, donating priority to its holder chain if the active
/// policy supports donation. Blocks if already held.
pub fn acquire(id: LockId) {
    crate::intr::without_interrupts(|| sched::with_kernel(|k| k.lock_acquire(id)));
}

/// Release `id`, restoring the caller's priority to the next-highest
/// donor (or its base priority) before waking a waiter.
pub fn release(id: LockId) {
    crate::intr::without_interrupts(|| sched::with_kernel(|k| k.lock_release(id)));
}

/// Attempt to acquire `id` without blocking. Never donates: there is no
/// wait to donate through when the caller doesn't block.
pub fn try_acquire(id: LockId) -> bool {
    crate::intr::without_interrupts(|| sched::with_kernel(|k| k.lock_try_acquire(id)))
}

/// True if the current thread holds `id`.
pub fn held_by_current(id: LockId) -> bool {
    sched::with_kernel(|k| k.lock(id).holder == Some(k.current()))
}

/// A thin handle around a [`LockId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock {
    id: LockId,
}

impl Lock {
    pub fn new() -> Self {
        Self { id: init() }
    }

    pub fn acquire(&self) {
        acquire(self.id);
    }

    pub fn release(&self) {
        release(self.id);
    }

    pub fn try_acquire(&self) -> bool {
        try_acquire(self.id)
    }

    pub fn held_by_current(&self) -> bool {
        held_by_current(self.id)
    }

    pub fn id(&self) -> LockId {
        self.id
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

/// Test-only support for the donation scenarios below.
///
/// These tests drive several simulated threads from one native call
/// stack (see `sched::set_current_for_test`): a real `lock_acquire`
/// would work for a single contended acquire, but its blocking loop
/// re-reads `self.current()` on every iteration, and since `block()`
/// here only flips a scheduling decision rather than performing a real
/// stack switch, a second iteration would start acting as whatever
/// thread `schedule()` picked rather than the original acquirer. This
/// helper performs exactly the non-blocking part of `lock_acquire`
/// (mark waiting, donate, enqueue) and then reschedules once, the way
/// the real function's single `block()` call would.
#[cfg(test)]
impl Kernel {
    pub(crate) fn lock_acquire_for_test_donation_only(&mut self, id: LockId) {
        let current = self.current();
        kassert!(
            self.lock(id).holder != Some(current),
            "thread attempted to re-acquire a lock it already holds"
        );

        self.thread_mut(current).waiting_on = WaitTarget::Lock(id);
        if self.donates() {
            self.donate_priority(id);
        }

        let sema = self.lock(id).sema;
        let priority = self.thread(current).current_priority;
        self.semaphore_mut(sema)
            .waiters
            .insert_by_key(current, |_| priority);
        self.thread_mut(current).state = ThreadState::Blocked;
        self.schedule();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerKind;
    use crate::sched::{self as sched_mod};

    fn set_current(tid: ThreadId) {
        sched_mod::set_current_for_test(tid);
    }

    /// S1 — single donation: L (20) holds X, H (40) arrives; L's
    /// current priority becomes 40 while blocked.
    #[test]
    fn single_donation_raises_holder_priority() {
        sched_mod::reset_for_test(SchedulerKind::Priority);
        let lock = Lock::new();

        let low = sched_mod::create("low", 20).unwrap();
        set_current(low);
        lock.acquire();
        assert!(lock.held_by_current());

        let high = sched_mod::create("high", 40).unwrap();
        set_current(high);
        sched_mod::with_kernel(|k| k.lock_acquire_for_test_donation_only(lock.id()));

        assert_eq!(sched_mod::current_priority(low), 40);

        set_current(low);
        lock.release();
        assert_eq!(sched_mod::current_priority(low), 20);
    }

    /// S2 — nested donation chain: T1(10) holds A, T2(20) holds B and
    /// blocks on A, T3(30) blocks on B; T2 and T1 both rise to 30.
    #[test]
    fn nested_donation_propagates_through_chain() {
        sched_mod::reset_for_test(SchedulerKind::Priority);
        let a = Lock::new();
        let b = Lock::new();

        let t1 = sched_mod::create("t1", 10).unwrap();
        set_current(t1);
        a.acquire();

        let t2 = sched_mod::create("t2", 20).unwrap();
        set_current(t2);
        b.acquire();
        sched_mod::with_kernel(|k| k.lock_acquire_for_test_donation_only(a.id()));

        let t3 = sched_mod::create("t3", 30).unwrap();
        set_current(t3);
        sched_mod::with_kernel(|k| k.lock_acquire_for_test_donation_only(b.id()));

        assert_eq!(sched_mod::current_priority(t2), 30);
        assert_eq!(sched_mod::current_priority(t1), 30);
    }

    /// S3 — multiple donors: waiters arrive 20, 40, 30; holder rises to
    /// 40; releasing wakes the 40-priority waiter first.
    #[test]
    fn multiple_donors_take_the_max_and_release_wakes_highest() {
        sched_mod::reset_for_test(SchedulerKind::Priority);
        let lock = Lock::new();

        let holder = sched_mod::create("holder", 10).unwrap();
        set_current(holder);
        lock.acquire();

        for (name, pri) in [("w1", 20), ("w2", 40), ("w3", 30)] {
            let w = sched_mod::create(name, pri).unwrap();
            set_current(w);
            sched_mod::with_kernel(|k| k.lock_acquire_for_test_donation_only(lock.id()));
        }

        assert_eq!(sched_mod::current_priority(holder), 40);

        set_current(holder);
        let woken = sched_mod::with_kernel(|k| k.semaphore(k.lock(lock.id()).sema).waiters.front().copied());
        lock.release();
        assert_eq!(sched_mod::current_priority(holder), 10);
        // The front of the (pre-release) waiter queue was the
        // priority-40 thread.
        let w2_priority = woken.map(|t| sched_mod::current_priority(t));
        assert_eq!(w2_priority, Some(40));
    }

    /// A thread holding two locks at once keeps an active donation
    /// through the one it still holds after releasing the other — the
    /// recompute must read each held lock's waiter queue live rather
    /// than a value cached at acquire time, since A's top waiter arrives
    /// only after both A and B are already held.
    #[test]
    fn donation_through_one_of_two_held_locks_survives_releasing_the_other() {
        sched_mod::reset_for_test(SchedulerKind::Priority);
        let a = Lock::new();
        let b = Lock::new();

        let holder = sched_mod::create("holder", 10).unwrap();
        set_current(holder);
        a.acquire();
        b.acquire();

        let high = sched_mod::create("high", 40).unwrap();
        set_current(high);
        sched_mod::with_kernel(|k| k.lock_acquire_for_test_donation_only(a.id()));
        assert_eq!(sched_mod::current_priority(holder), 40);

        set_current(holder);
        b.release();
        // Still donated through A, which holder still holds.
        assert_eq!(sched_mod::current_priority(holder), 40);

        a.release();
        assert_eq!(sched_mod::current_priority(holder), 10);
    }

    #[test]
    fn try_acquire_never_donates_and_fails_when_held() {
        sched_mod::reset_for_test(SchedulerKind::Priority);
        let lock = Lock::new();

        let holder = sched_mod::create("holder", 10).unwrap();
        set_current(holder);
        assert!(lock.try_acquire());

        let high = sched_mod::create("high", 40).unwrap();
        set_current(high);
        assert!(!lock.try_acquire());
        // A non-blocking attempt never donates: the holder's priority
        // is untouched.
        assert_eq!(sched_mod::current_priority(holder), 10);

        set_current(holder);
        lock.release();
        set_current(high);
        assert!(lock.try_acquire());
        assert!(lock.held_by_current());
    }
}
