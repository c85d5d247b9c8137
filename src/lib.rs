/*
 * Thread Scheduler & Synchronization Core
 *
 * This crate is the scheduler/synchronization core of a small teaching
 * kernel: thread lifecycle, the priority-scheduler donation protocol, the
 * 4-level MLFQS policy, and the semaphore/lock/condvar primitives built
 * on top. It is a library, not a bootable kernel — the interrupt
 * controller, timer device, console and bootstrap are external
 * collaborators that an embedding kernel supplies through the narrow
 * interfaces in [`intr`].
 *
 * `#![no_std]` so it can be linked straight into a bare-metal kernel
 * binary; it flips to a hosted build under `cfg(test)` so the whole
 * suite runs under `cargo test` on the host, without any hardware. The
 * crate needs a heap (`Vec`, `String`, the arenas in `sched::Kernel`)
 * but not a particular allocator — an embedding kernel installs its own
 * `#[global_allocator]` the same way it would for any other `no_std`
 * dependency; the host test build gets one for free from `std`.
 */
#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod config;
pub mod error;
pub mod fixed_point;
pub mod intr;
pub mod list;
pub mod logging;
pub mod sched;
pub mod sync;

pub use config::SchedulerKind;
pub use error::KernelError;
pub use fixed_point::Fixed;
pub use sched::{ThreadId, ThreadSnapshot, ThreadState};
pub use sync::{CondVar, Lock, Semaphore};

/// Boot the scheduler core with the given policy (spec §6: "a
/// configuration switch selecting the scheduler at boot, `PS` default").
///
/// Thin re-export of [`sched::init`] at the crate root, since it's the
/// one call every embedding kernel makes exactly once, before any other
/// operation in this crate is legal.
pub fn init(kind: SchedulerKind) {
    sched::init(kind);
}
