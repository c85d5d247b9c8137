/*
 * Error Handling
 *
 * The synchronization core has no recoverable error paths (spec §7):
 * programming-contract violations are fail-stop, and the only error a
 * caller can observe and act on is thread-resource exhaustion. This
 * mirrors the teacher's own style of `Result<(), &'static str>` for the
 * one fallible entry point (`ThreadManager::setup_userspace`) and
 * `panic!`/`ASSERT`-style aborts everywhere else.
 */

use core::fmt;

/// The only recoverable error this crate ever returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// `thread::spawn` could not allocate a stack or TCB slot for the
    /// new thread. No partial state is left behind: the caller gets
    /// this error instead of a thread id, and the thread table is
    /// unchanged.
    ThreadAllocationFailed,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::ThreadAllocationFailed => {
                write!(f, "failed to allocate resources for new thread")
            }
        }
    }
}

/// Fail-stop on a violated programming contract.
///
/// Every call site in this crate that would otherwise need to "handle"
/// an impossible state (double-acquiring a held lock, releasing a lock
/// the caller doesn't hold, blocking with interrupts enabled, waking a
/// thread that isn't blocked) goes through this macro instead. It logs
/// at `error` level before panicking so the message survives even if the
/// panic hook itself is minimal (as it is on bare metal).
#[macro_export]
macro_rules! kbug {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        panic!($($arg)*);
    }};
}

/// Fail-stop unless `cond` holds. The no_std analogue of Pintos's
/// `ASSERT`.
#[macro_export]
macro_rules! kassert {
    ($cond:expr) => {
        if !($cond) {
            $crate::kbug!("assertion failed: {}", stringify!($cond));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::kbug!($($arg)*);
        }
    };
}
