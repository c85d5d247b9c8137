/*
 * Synchronization Primitives
 *
 * Three primitives, layered the way spec §4 lays them out: a counting
 * [`semaphore`] with a priority-ordered waiter queue is the only thing
 * that actually blocks a thread; [`lock`] is a single-owner semaphore
 * wrapper with priority-donation bookkeeping on top, for the `PS`
 * policy; [`condvar`] is a Mesa-style condition variable whose waiters
 * each own a private binary semaphore.
 *
 * Every operation here is a thin free function that takes the kernel
 * mutex via `sched::with_kernel` and calls into a matching `impl Kernel`
 * method defined in the submodule — the same split `sched` itself uses
 * between its public free functions and `Kernel`'s private methods.
 */

pub mod condvar;
pub mod lock;
pub mod semaphore;

pub use condvar::CondVar;
pub use lock::Lock;
pub use semaphore::Semaphore;
