/*
 * Multilevel Feedback Queue Scheduler (MLFQS)
 *
 * Two halves:
 *
 *   - `MlfqsScheduler`, a `SchedPolicy` that orders the ready set as 64
 *     FIFO sub-queues indexed by priority (spec §4.5: "the ready
 *     structure may be organized as 64 FIFO sub-queues indexed by
 *     priority; picking the next runnable thread scans high priority to
 *     low"). It never re-sorts within a level — MLFQS priorities only
 *     change at tick boundaries, at which point the thread is re-homed
 *     to its new queue, not bumped within the old one. The 64 slots
 *     themselves are a fixed-capacity `heapless::Vec`, not a heap `Vec`
 *     — the level count is known at compile time and never changes, so
 *     there is no reason to pay a heap allocation (and indirection) for
 *     the outer container on top of the one each `OrderedQueue` already
 *     owns for its items.
 *
 *   - Free functions implementing the recent-cpu/load-average/priority
 *     formulas (spec §4.5), called from `sched::Kernel::tick` which has
 *     the whole-thread-table access these formulas need ("for every
 *     thread (any state)") that a `SchedPolicy`, scoped to the ready
 *     set, does not.
 */

use alloc::vec::Vec;
use heapless::Vec as FixedVec;

use super::policy::{PolicyCtx, SchedPolicy};
use super::thread::ThreadId;
use crate::config::{self, PRI_LEVELS};
use crate::fixed_point::Fixed;
use crate::list::OrderedQueue;

pub struct MlfqsScheduler {
    /// `queues[p]` holds threads at priority `PRI_MIN + p`, FIFO.
    queues: FixedVec<OrderedQueue<ThreadId>, PRI_LEVELS>,
}

fn level_of(priority: i32) -> usize {
    (config::clamp_priority(priority) - config::PRI_MIN) as usize
}

impl MlfqsScheduler {
    pub fn new() -> Self {
        let mut queues = FixedVec::new();
        for _ in 0..PRI_LEVELS {
            queues
                .push(OrderedQueue::new())
                .ok()
                .expect("PRI_LEVELS must not exceed the fixed queue capacity");
        }
        Self { queues }
    }
}

impl Default for MlfqsScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedPolicy for MlfqsScheduler {
    fn on_ready(&mut self, ctx: &dyn PolicyCtx, tid: ThreadId) {
        let priority = ctx.priority_of(tid).unwrap_or(config::PRI_MIN);
        let level = level_of(priority);
        if !self.queues[level].contains(|&t| t == tid) {
            // FIFO within a level: arrival order is preserved by using
            // insertion order itself as the key.
            let order = self.queues[level].len() as i64;
            self.queues[level].insert_by_key(tid, move |_| order);
        }
    }

    fn on_unready(&mut self, ctx: &dyn PolicyCtx, tid: ThreadId) {
        let priority = ctx.priority_of(tid).unwrap_or(config::PRI_MIN);
        self.queues[level_of(priority)].retain(|&t| t != tid);
    }

    fn on_priority_changed(&mut self, ctx: &dyn PolicyCtx, tid: ThreadId, old_priority: i32) {
        // The caller has already updated the thread's priority by the
        // time this runs, so `old_priority` is the only way left to
        // find which level's queue `tid` might still be sitting in. A
        // thread that isn't READY isn't in any queue; nothing to do.
        let old_level = level_of(old_priority);
        if self.queues[old_level].contains(|&t| t == tid) {
            self.queues[old_level].retain(|&t| t != tid);
            self.on_ready(ctx, tid);
        }
    }

    fn pick_next(&mut self, _ctx: &dyn PolicyCtx) -> Option<ThreadId> {
        self.queues
            .iter_mut()
            .rev()
            .find_map(|q| q.pop_front())
    }

    fn has_higher_priority_ready(&self, ctx: &dyn PolicyCtx, than: ThreadId) -> bool {
        let baseline = level_of(ctx.priority_of(than).unwrap_or(config::PRI_MIN));
        self.queues[baseline + 1..].iter().any(|q| !q.is_empty())
    }

    fn donates(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "mlfqs"
    }
}

/// `recent_cpu += 1` on every tick the running thread is not idle
/// (spec §4.5).
pub fn tick_recent_cpu(recent_cpu: Fixed) -> Fixed {
    recent_cpu.add_int(1)
}

/// `load_avg = (59/60) * load_avg + (1/60) * ready_threads`.
pub fn recompute_load_avg(load_avg: Fixed, ready_threads: usize) -> Fixed {
    let fifty_nine_sixtieths = Fixed::from_int(59).div_int(60);
    let one_sixtieth = Fixed::from_int(1).div_int(60);
    fifty_nine_sixtieths
        .mul(load_avg)
        .add(one_sixtieth.mul_int(ready_threads as i32))
}

/// `recent_cpu = (2*load_avg)/(2*load_avg + 1) * recent_cpu + niceness`.
pub fn recompute_recent_cpu(recent_cpu: Fixed, load_avg: Fixed, niceness: i32) -> Fixed {
    let two_load_avg = load_avg.mul_int(2);
    let coefficient = two_load_avg.div(two_load_avg.add_int(1));
    coefficient.mul(recent_cpu).add_int(niceness)
}

/// `priority = PRI_MAX - trunc(recent_cpu/4) - niceness*2`, clamped
/// (spec §8 testable property 5). The `recent_cpu/4` term is truncated
/// to an integer *before* the subtraction, not the whole expression
/// afterward — those diverge whenever `recent_cpu/4`'s fractional part
/// exceeds 0.5 (e.g. `recent_cpu = to_fp(7)`: `63 - trunc(1.75) - 0 =
/// 62`, but rounding the whole `61.25` expression would give 61).
pub fn recompute_priority(recent_cpu: Fixed, niceness: i32) -> i32 {
    let recent_cpu_term = recent_cpu.div_int(4).to_int_trunc();
    config::clamp_priority(config::PRI_MAX - recent_cpu_term - niceness * 2)
}
