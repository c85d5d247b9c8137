/*
 * Priority Scheduler (PS)
 *
 * Strict priority order, FIFO among equals, with donation handled
 * upstream in `sync::lock` (this policy only orders the ready set; it
 * has no opinion on how a thread's priority got to be what it is).
 *
 * The ready set is kept as an `OrderedQueue` sorted by current priority
 * descending (spec §3 invariant 5), re-sorted whenever a tracked
 * thread's priority changes rather than re-inserted, so FIFO order
 * among untouched equal-priority threads survives a donation elsewhere
 * in the queue.
 */

use super::policy::{PolicyCtx, SchedPolicy};
use super::thread::ThreadId;
use crate::list::OrderedQueue;

pub struct PriorityScheduler {
    ready: OrderedQueue<ThreadId>,
}

impl PriorityScheduler {
    pub const fn new() -> Self {
        Self {
            ready: OrderedQueue::new(),
        }
    }
}

impl Default for PriorityScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedPolicy for PriorityScheduler {
    fn on_ready(&mut self, ctx: &dyn PolicyCtx, tid: ThreadId) {
        if self.ready.contains(|&t| t == tid) {
            return;
        }
        let priority = ctx.priority_of(tid).unwrap_or(crate::config::PRI_MIN);
        self.ready.insert_by_key(tid, |_| priority);
    }

    fn on_unready(&mut self, _ctx: &dyn PolicyCtx, tid: ThreadId) {
        self.ready.retain(|&t| t != tid);
    }

    fn on_priority_changed(&mut self, ctx: &dyn PolicyCtx, _tid: ThreadId, _old_priority: i32) {
        self.ready
            .sort_by_key(|&t| ctx.priority_of(t).unwrap_or(crate::config::PRI_MIN));
    }

    fn pick_next(&mut self, _ctx: &dyn PolicyCtx) -> Option<ThreadId> {
        self.ready.pop_front()
    }

    fn has_higher_priority_ready(&self, ctx: &dyn PolicyCtx, than: ThreadId) -> bool {
        let baseline = ctx.priority_of(than).unwrap_or(crate::config::PRI_MIN);
        self.ready
            .front()
            .and_then(|&t| ctx.priority_of(t))
            .is_some_and(|p| p > baseline)
    }

    fn donates(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "priority"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;

    struct FakeCtx {
        priorities: BTreeMap<usize, i32>,
    }

    impl PolicyCtx for FakeCtx {
        fn priority_of(&self, tid: ThreadId) -> Option<i32> {
            self.priorities.get(&tid.0).copied()
        }
        fn ready_threads(&self) -> alloc::vec::Vec<ThreadId> {
            self.priorities.keys().map(|&id| ThreadId(id)).collect()
        }
    }

    #[test]
    fn picks_highest_priority_first() {
        let mut priorities = BTreeMap::new();
        priorities.insert(1, 20);
        priorities.insert(2, 40);
        priorities.insert(3, 30);
        let ctx = FakeCtx { priorities };

        let mut policy = PriorityScheduler::new();
        policy.on_ready(&ctx, ThreadId(1));
        policy.on_ready(&ctx, ThreadId(2));
        policy.on_ready(&ctx, ThreadId(3));

        assert_eq!(policy.pick_next(&ctx), Some(ThreadId(2)));
        assert_eq!(policy.pick_next(&ctx), Some(ThreadId(3)));
        assert_eq!(policy.pick_next(&ctx), Some(ThreadId(1)));
        assert_eq!(policy.pick_next(&ctx), None);
    }

    #[test]
    fn ties_preserve_fifo_order() {
        let mut priorities = BTreeMap::new();
        priorities.insert(1, 10);
        priorities.insert(2, 10);
        let ctx = FakeCtx { priorities };

        let mut policy = PriorityScheduler::new();
        policy.on_ready(&ctx, ThreadId(1));
        policy.on_ready(&ctx, ThreadId(2));

        assert_eq!(policy.pick_next(&ctx), Some(ThreadId(1)));
        assert_eq!(policy.pick_next(&ctx), Some(ThreadId(2)));
    }

    #[test]
    fn reordering_after_donation_is_reflected() {
        let mut priorities = BTreeMap::new();
        priorities.insert(1, 10);
        priorities.insert(2, 20);
        let mut ctx = FakeCtx { priorities };

        let mut policy = PriorityScheduler::new();
        policy.on_ready(&ctx, ThreadId(1));
        policy.on_ready(&ctx, ThreadId(2));

        ctx.priorities.insert(1, 99);
        policy.on_priority_changed(&ctx, ThreadId(1), 10);

        assert_eq!(policy.pick_next(&ctx), Some(ThreadId(1)));
    }

    #[test]
    fn higher_priority_ready_detects_outranking_thread() {
        let mut priorities = BTreeMap::new();
        priorities.insert(1, 10);
        priorities.insert(2, 50);
        let ctx = FakeCtx { priorities };

        let mut policy = PriorityScheduler::new();
        policy.on_ready(&ctx, ThreadId(2));

        assert!(policy.has_higher_priority_ready(&ctx, ThreadId(1)));
    }
}
