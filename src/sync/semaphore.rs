/*
 * Counting Semaphore
 *
 * The one primitive in this crate that actually suspends a thread
 * (spec §4.2). Every other primitive — lock, condvar — is built by
 * composing a semaphore with extra bookkeeping, so the blocking loop
 * lives here exactly once: insert the caller into a waiter queue kept
 * sorted by current priority descending, record what it's waiting on
 * via `WaitTarget` (so a donation walk elsewhere can find and re-sort
 * this queue), and block.
 *
 * `sema_down_marked` exists because a lock or condvar blocking on its
 * own private semaphore still needs the thread's `waiting_on` to read
 * `Lock(id)` or `Condvar(id)`, not `Semaphore(id)` — the donation
 * walker in `sync::lock` pattern-matches on that tag to decide whether
 * it can keep recursing through a holder.
 */

use crate::config;
use crate::intr;
use crate::kassert;
use crate::list::OrderedQueue;
use crate::sched::{self, Kernel, SemaphoreId, ThreadId, WaitTarget};

/// Counting semaphore state: a non-negative counter plus a waiter queue
/// sorted by current priority descending (spec §3).
pub(crate) struct SemaphoreState {
    pub(crate) count: usize,
    pub(crate) waiters: OrderedQueue<ThreadId>,
}

impl Kernel {
    pub(crate) fn semaphore(&self, id: SemaphoreId) -> &SemaphoreState {
        match self.semaphores.get(id.0).and_then(|s| s.as_ref()) {
            Some(s) => s,
            None => crate::kbug!("reference to nonexistent semaphore {:?}", id),
        }
    }

    pub(crate) fn semaphore_mut(&mut self, id: SemaphoreId) -> &mut SemaphoreState {
        match self.semaphores.get_mut(id.0).and_then(|s| s.as_mut()) {
            Some(s) => s,
            None => crate::kbug!("reference to nonexistent semaphore {:?}", id),
        }
    }

    pub(crate) fn sema_init(&mut self, value: usize) -> SemaphoreId {
        let state = SemaphoreState {
            count: value,
            waiters: OrderedQueue::new(),
        };
        match self.semaphores.iter().position(|s| s.is_none()) {
            Some(idx) => {
                self.semaphores[idx] = Some(state);
                SemaphoreId(idx)
            }
            None => {
                kassert!(
                    self.semaphores.len() < config::MAX_SEMAPHORES,
                    "semaphore table exhausted"
                );
                let id = SemaphoreId(self.semaphores.len());
                self.semaphores.push(Some(state));
                id
            }
        }
    }

    /// Free a semaphore's arena slot so `sema_init` can reuse it. Only
    /// safe once nothing still references `id` — in particular, a
    /// condvar's per-waiter private semaphore (spec §4.4), which is
    /// otherwise never reclaimed and would exhaust `MAX_SEMAPHORES`
    /// under sustained `cond_wait` use, unlike a lock's backing
    /// semaphore, which lives as long as the lock itself (spec §3:
    /// "their lifetime is dictated by their enclosing object").
    pub(crate) fn sema_free(&mut self, id: SemaphoreId) {
        self.semaphores[id.0] = None;
    }

    /// The common blocking loop, parameterized by what `waiting_on`
    /// should read while blocked. Plain `sema_down` passes
    /// `WaitTarget::Semaphore(id)`; `sync::lock` and `sync::condvar`
    /// pass their own tag so the donation walker sees the right object.
    pub(crate) fn sema_down_marked(&mut self, id: SemaphoreId, marker: WaitTarget) {
        kassert!(
            !intr::in_handler(),
            "down() must not be called from interrupt context"
        );
        loop {
            if self.semaphore(id).count > 0 {
                break;
            }
            let current = self.current();
            let priority = self.thread(current).current_priority;
            self.semaphore_mut(id)
                .waiters
                .insert_by_key(current, |_| priority);
            self.thread_mut(current).waiting_on = marker;
            self.block();
            self.thread_mut(current).waiting_on = WaitTarget::None;
        }
        self.semaphore_mut(id).count -= 1;
    }

    pub(crate) fn sema_down(&mut self, id: SemaphoreId) {
        self.sema_down_marked(id, WaitTarget::Semaphore(id));
    }

    pub(crate) fn sema_try_down(&mut self, id: SemaphoreId) -> bool {
        if self.semaphore(id).count > 0 {
            self.semaphore_mut(id).count -= 1;
            true
        } else {
            false
        }
    }

    /// Pop the highest-priority waiter (if any) and unblock it, then
    /// increment the counter. Yields immediately if the woken thread
    /// now outranks the running thread, unless called from interrupt
    /// context, in which case the yield is deferred (spec §4.2).
    pub(crate) fn sema_up(&mut self, id: SemaphoreId) {
        let woken = self.semaphore_mut(id).waiters.pop_front();
        self.semaphore_mut(id).count += 1;

        if let Some(tid) = woken {
            self.unblock(tid);

            let current = self.current();
            if self.thread(tid).current_priority > self.thread(current).current_priority {
                if intr::in_handler() {
                    intr::request_yield_on_return();
                } else {
                    self.yield_now();
                }
            }
        }
    }
}

/// Allocate a new semaphore with the given initial count.
pub fn init(value: usize) -> SemaphoreId {
    intr::without_interrupts(|| sched::with_kernel(|k| k.sema_init(value)))
}

/// Decrement, blocking while the count is zero. Must not be called from
/// interrupt context.
pub fn down(id: SemaphoreId) {
    intr::without_interrupts(|| sched::with_kernel(|k| k.sema_down(id)));
}

/// Non-blocking decrement. Safe to call from interrupt context.
pub fn try_down(id: SemaphoreId) -> bool {
    intr::without_interrupts(|| sched::with_kernel(|k| k.sema_try_down(id)))
}

/// Increment, waking the highest-priority waiter if any. Safe to call
/// from interrupt context.
pub fn up(id: SemaphoreId) {
    intr::without_interrupts(|| sched::with_kernel(|k| k.sema_up(id)));
}

/// A thin handle around a [`SemaphoreId`], for callers that would
/// rather hold a value than thread an id through their own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Semaphore {
    id: SemaphoreId,
}

impl Semaphore {
    pub fn new(value: usize) -> Self {
        Self { id: init(value) }
    }

    pub fn down(&self) {
        down(self.id);
    }

    pub fn try_down(&self) -> bool {
        try_down(self.id)
    }

    pub fn up(&self) {
        up(self.id);
    }

    pub fn id(&self) -> SemaphoreId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerKind;
    use crate::sched::{self as sched_mod};

    #[test]
    fn try_down_respects_the_counter() {
        sched_mod::reset_for_test(SchedulerKind::Priority);
        let sem = Semaphore::new(1);

        assert!(sem.try_down());
        assert!(!sem.try_down());
        sem.up();
        assert!(sem.try_down());
    }

    #[test]
    fn ordering_guarantee_highest_priority_waiter_wakes_first() {
        sched_mod::reset_for_test(SchedulerKind::Priority);
        let sem = Semaphore::new(1);
        assert!(sem.try_down());

        let low = sched_mod::create("low", 10).unwrap();
        let high = sched_mod::create("high", 40).unwrap();

        sched_mod::with_kernel(|k| {
            let priority_low = k.thread(low).current_priority;
            k.semaphore_mut(sem.id())
                .waiters
                .insert_by_key(low, |_| priority_low);
            let priority_high = k.thread(high).current_priority;
            k.semaphore_mut(sem.id())
                .waiters
                .insert_by_key(high, |_| priority_high);
        });

        assert_eq!(
            sched_mod::with_kernel(|k| k.semaphore(sem.id()).waiters.front().copied()),
            Some(high)
        );
    }
}
