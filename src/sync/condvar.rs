/*
 * Condition Variable (Mesa Semantics)
 *
 * A condvar owns no wake mechanism of its own: each `wait` call pushes a
 * fresh, private binary semaphore (count 0) onto the condvar's waiter
 * list and blocks on that semaphore alone (spec §4.4). `signal` and
 * `broadcast` never touch the caller's state directly — they just `up`
 * the chosen waiter's private semaphore, exactly like releasing any
 * other semaphore, so the existing ordering guarantee from `sync::
 * semaphore` ("if the unblocked thread outranks the running thread,
 * yield") falls out for free.
 *
 * Sorting the waiter list by "top waiter priority of each record's
 * private semaphore" is the same operation `sync::lock`'s donation walk
 * needs when it re-sorts a condvar a donee is blocked on, so both reuse
 * `Kernel::resort_condvar_waiters`.
 *
 * Mesa semantics means `signal`/`wait` are not atomic with the lock: a
 * woken waiter reacquires the lock like any other contender and must
 * re-check its own predicate. This module does not loop internally —
 * see the doc example on [`CondVar::wait`].
 */

use crate::config;
use crate::kassert;
use crate::list::OrderedQueue;
use crate::sched::{self, CondvarId, Kernel, LockId, SemaphoreId, ThreadId, WaitTarget};

/// One `wait` call's bookkeeping: the private semaphore it blocks on,
/// and which thread owns it (used only for diagnostics; the priority
/// used for sorting is read back off the semaphore's own waiter queue,
/// which contains exactly this thread while it's blocked).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaiterRecord {
    pub(crate) sema: SemaphoreId,
    pub(crate) thread: ThreadId,
}

/// Condvar state: an unordered-until-signaled list of waiter records
/// (spec §3: "not required to stay sorted between operations but is
/// re-sorted at signal/broadcast time").
pub(crate) struct CondvarState {
    pub(crate) waiters: OrderedQueue<WaiterRecord>,
}

impl Kernel {
    pub(crate) fn condvar(&self, id: CondvarId) -> &CondvarState {
        match self.condvars.get(id.0).and_then(|c| c.as_ref()) {
            Some(c) => c,
            None => crate::kbug!("reference to nonexistent condvar {:?}", id),
        }
    }

    pub(crate) fn condvar_mut(&mut self, id: CondvarId) -> &mut CondvarState {
        match self.condvars.get_mut(id.0).and_then(|c| c.as_mut()) {
            Some(c) => c,
            None => crate::kbug!("reference to nonexistent condvar {:?}", id),
        }
    }

    pub(crate) fn condvar_init(&mut self) -> CondvarId {
        kassert!(
            self.condvars.len() < config::MAX_CONDVARS,
            "condvar table exhausted"
        );
        let id = CondvarId(self.condvars.len());
        self.condvars.push(Some(CondvarState {
            waiters: OrderedQueue::new(),
        }));
        id
    }

    pub(crate) fn cond_wait(&mut self, id: CondvarId, lock: LockId) {
        let current = self.current();
        kassert!(
            self.lock(lock).holder == Some(current),
            "cond_wait called without holding the associated lock"
        );

        let sema = self.sema_init(0);
        let priority = self.thread(current).current_priority;
        self.condvar_mut(id)
            .waiters
            .insert_by_key(WaiterRecord { sema, thread: current }, |_| priority);

        self.lock_release(lock);

        self.thread_mut(current).waiting_on = WaitTarget::Condvar(id);
        self.sema_down_marked(sema, WaitTarget::Condvar(id));
        self.thread_mut(current).waiting_on = WaitTarget::None;

        self.lock_acquire(lock);
        self.sema_free(sema);
    }

    pub(crate) fn cond_signal(&mut self, id: CondvarId, lock: LockId) {
        kassert!(
            self.lock(lock).holder == Some(self.current()),
            "cond_signal called without holding the associated lock"
        );

        self.resort_condvar_waiters(id);
        if let Some(w) = self.condvar_mut(id).waiters.pop_front() {
            self.sema_up(w.sema);
        }
    }

    pub(crate) fn cond_broadcast(&mut self, id: CondvarId, lock: LockId) {
        kassert!(
            self.lock(lock).holder == Some(self.current()),
            "cond_broadcast called without holding the associated lock"
        );

        self.resort_condvar_waiters(id);
        while let Some(w) = self.condvar_mut(id).waiters.pop_front() {
            self.sema_up(w.sema);
        }
    }
}

/// Allocate a new, empty condition variable.
pub fn init() -> CondvarId {
    crate::intr::without_interrupts(|| sched::with_kernel(|k| k.condvar_init()))
}

/// Wait on `id`. The caller must hold `lock`; this releases it for the
/// duration of the wait and reacquires it before returning.
///
/// Mesa semantics: a `signal` wakes this call, but does not transfer
/// the lock atomically, and another thread may run (and falsify the
/// condition) between the wake and the reacquire. Callers must loop on
/// their own predicate:
///
/// ```ignore
/// lock.acquire();
/// while !condition_holds() {
///     condvar::wait(cv, lock.id());
/// }
/// // condition_holds() is now known true, under lock.
/// lock.release();
/// ```
pub fn wait(id: CondvarId, lock: LockId) {
    crate::intr::without_interrupts(|| sched::with_kernel(|k| k.cond_wait(id, lock)));
}

/// Wake the highest-priority waiter on `id`, if any. Caller must hold
/// `lock`.
pub fn signal(id: CondvarId, lock: LockId) {
    crate::intr::without_interrupts(|| sched::with_kernel(|k| k.cond_signal(id, lock)));
}

/// Wake every waiter on `id`, highest priority first. Caller must hold
/// `lock`.
pub fn broadcast(id: CondvarId, lock: LockId) {
    crate::intr::without_interrupts(|| sched::with_kernel(|k| k.cond_broadcast(id, lock)));
}

/// A thin handle around a [`CondvarId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondVar {
    id: CondvarId,
}

impl CondVar {
    pub fn new() -> Self {
        Self { id: init() }
    }

    pub fn wait(&self, lock: LockId) {
        wait(self.id, lock);
    }

    pub fn signal(&self, lock: LockId) {
        signal(self.id, lock);
    }

    pub fn broadcast(&self, lock: LockId) {
        broadcast(self.id, lock);
    }

    pub fn id(&self) -> CondvarId {
        self.id
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}
