//! Integration tests driving `sched-core` purely through its public
//! surface — no `pub(crate)` test hooks, no reaching into `sched`/`sync`
//! internals. Everything here is exactly what an embedding kernel could
//! call.
//!
//! `sched_core::sched::init` may only run once per process (it panics on
//! a second call), and the whole crate's state lives behind one process
//! -global `KERNEL` static, so this file is deliberately one `#[test]`
//! function rather than several that would race each other's boot call
//! under cargo's default parallel test harness.
//!
//! Scenarios S1-S4 (priority donation, condvar wake order) are not
//! exercised here: this crate models scheduling *decisions*, not a real
//! context switch (see `sched::Kernel::schedule`'s doc comment), so
//! replaying "thread A blocks mid-call, thread B resumes" from a single
//! external call stack would spin forever inside the blocking primitive
//! waiting for a release that only a second, genuinely concurrent
//! caller could ever issue. Those scenarios are covered as `#[cfg(test)]`
//! unit tests colocated with `sync::lock` and `sync::condvar`, using
//! test-only hooks that set up the intermediate blocked/donated state
//! directly instead of actually blocking.

use sched_core::sched::{self, mlfqs, ThreadState};
use sched_core::sync::{CondVar, Lock};
use sched_core::{Fixed, SchedulerKind};

#[test]
fn scenarios() {
    sched_core::init(SchedulerKind::Priority);

    // --- thread creation and priority bookkeeping ---
    let low = sched::create("low", 10).unwrap();
    let mid = sched::create("mid", 20).unwrap();
    let high = sched::create("high", 30).unwrap();
    assert_eq!(sched::get_priority(low), 10);
    assert_eq!(sched::get_priority(mid), 20);
    assert_eq!(sched::current_thread_id(), high);

    sched::set_priority(low, 25);
    assert_eq!(sched::get_priority(low), 25);
    assert_eq!(sched::current_priority(low), 25);

    // --- lock/condvar usable end to end without contention ---
    // `high` is current; it can acquire and release uncontended.
    let lock = Lock::new();
    let cv = CondVar::new();
    lock.acquire();
    assert!(lock.held_by_current());
    // No one is waiting, so signal/broadcast are harmless no-ops.
    cv.signal(lock.id());
    cv.broadcast(lock.id());
    lock.release();
    assert!(!lock.held_by_current());

    // --- S6: timer sleep wakes exactly at the target tick ---
    // `sleep_until` blocks the calling thread with a single `block()`
    // call (no internal retry loop), so it's safe to drive directly:
    // the thread that was "current" when it slept simply stops being
    // current once `schedule()` picks someone else, and the test only
    // inspects that thread's snapshot afterward rather than resuming
    // "as" it.
    let start = sched::ticks();
    sched::sleep_until(start + 10);
    for _ in 0..9 {
        sched::tick();
        assert_eq!(sched::get_by_id(high).unwrap().state, ThreadState::Blocked);
    }
    sched::tick();
    // `high` (priority 30) outranks whatever is current at this point,
    // so waking it on this tick doesn't just make it READY: the same
    // `tick()` call's outranked-check immediately yields to it.
    assert_eq!(sched::get_by_id(high).unwrap().state, ThreadState::Running);
    assert_eq!(sched::current_thread_id(), high);

    // --- S5: MLFQS priority/recent_cpu/load_avg formulas ---
    // priority = PRI_MAX - trunc(recent_cpu/4) - nice*2: 63 - trunc(1.25=1) - 0 = 62.
    let recent_cpu = Fixed::from_int(5);
    assert_eq!(mlfqs::recompute_priority(recent_cpu, 0), 62);
    assert_eq!(mlfqs::recompute_priority(recent_cpu, 5), 52);

    // load_avg starts at 0 with one ready thread: load_avg trends up
    // from zero, never negative, and stays well under 1.0 after a
    // single tick.
    let load_avg = mlfqs::recompute_load_avg(Fixed::from_int(0), 1);
    assert!(load_avg.to_int_round() >= 0);
    assert!(load_avg < Fixed::from_int(1));

    // recent_cpu grows by one per tick while running, feeds back into
    // the decay formula without overflowing or going negative for a
    // thread that has barely run.
    let ticked = mlfqs::tick_recent_cpu(Fixed::from_int(0));
    assert_eq!(ticked.to_int_trunc(), 1);
    let decayed = mlfqs::recompute_recent_cpu(ticked, Fixed::from_int(1), 0);
    assert!(decayed.to_int_round() >= 0);
}
