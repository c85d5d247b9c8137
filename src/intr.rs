/*
 * Interrupt Gate
 *
 * The interrupt controller and its disable/enable/level semantics are an
 * external collaborator (spec §6): this crate only consumes the
 * contract, never implements a PIC/APIC driver. What it needs is:
 *
 *   intr_disable() -> level, intr_enable(), intr_set_level(level),
 *   intr_get_level() -> level, intr_context() -> bool,
 *   intr_yield_on_return()
 *
 * On a real x86_64 target this is the CPU's IF flag, exactly as the
 * teacher's `arch::x86_64::interrupts` module wraps it (disable/enable/
 * are_enabled/without_interrupts/`DisableInterrupts` RAII guard). But
 * `cli`/`sti` are privileged instructions: running them from a hosted
 * `cargo test` process (ring 3, no hardware interrupts to mask) would
 * fault. Per the redesign note in spec §9 ("implementers on hosted
 * runtimes cannot disable hardware interrupts; the equivalent is a
 * single global critical-section mechanism"), the non-bare-metal build
 * (anything under `cfg(test)`, and any non-x86_64 host target) instead
 * uses a cooperative global level flag: since scheduling in this crate
 * is itself cooperative between calls, that flag is sufficient to
 * reproduce the same ordering guarantees the real instructions give.
 */

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Interrupt level: on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    Enabled,
    Disabled,
}

#[cfg(all(target_arch = "x86_64", not(test)))]
mod backend {
    use super::IntrLevel;

    pub fn are_enabled() -> bool {
        x86_64::instructions::interrupts::are_enabled()
    }

    pub fn disable() {
        x86_64::instructions::interrupts::disable();
    }

    pub fn enable() {
        x86_64::instructions::interrupts::enable();
    }

    pub fn set_level(level: IntrLevel) {
        match level {
            IntrLevel::Enabled => enable(),
            IntrLevel::Disabled => disable(),
        }
    }
}

#[cfg(not(all(target_arch = "x86_64", not(test))))]
mod backend {
    use super::IntrLevel;
    use core::sync::atomic::{AtomicBool, Ordering};

    static SIMULATED_ENABLED: AtomicBool = AtomicBool::new(true);

    pub fn are_enabled() -> bool {
        SIMULATED_ENABLED.load(Ordering::SeqCst)
    }

    pub fn disable() {
        SIMULATED_ENABLED.store(false, Ordering::SeqCst);
    }

    pub fn enable() {
        SIMULATED_ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn set_level(level: IntrLevel) {
        match level {
            IntrLevel::Enabled => enable(),
            IntrLevel::Disabled => disable(),
        }
    }
}

/// True while the (simulated or real) CPU is executing inside an
/// interrupt handler. An embedding kernel's ISR trampoline should set
/// this before dispatching to `sched::tick` and clear it on return; a
/// test that wants to exercise "called from interrupt context" behavior
/// can do the same via [`enter_handler_for_test`].
static IN_HANDLER: AtomicBool = AtomicBool::new(false);

/// Set when code running with interrupts disabled (often inside a
/// handler) wants a reschedule that it cannot perform immediately.
/// The interrupt-exit trampoline is expected to check and clear this.
static DEFERRED_YIELD: AtomicBool = AtomicBool::new(false);

/// Disable interrupts, returning the previous level so the caller can
/// restore it later with [`set_level`].
pub fn disable() -> IntrLevel {
    let prev = get_level();
    backend::disable();
    prev
}

/// Enable interrupts unconditionally.
pub fn enable() {
    backend::enable();
}

/// Restore a previously saved interrupt level.
pub fn set_level(level: IntrLevel) {
    backend::set_level(level);
}

/// Read the current interrupt level without changing it.
pub fn get_level() -> IntrLevel {
    if backend::are_enabled() {
        IntrLevel::Enabled
    } else {
        IntrLevel::Disabled
    }
}

/// True if the caller is running inside an interrupt handler.
pub fn in_handler() -> bool {
    IN_HANDLER.load(Ordering::SeqCst)
}

/// Ask that a reschedule happen before control returns to the
/// interrupted thread, because the caller can't yield directly (it's
/// running in interrupt context with interrupts disabled).
pub fn request_yield_on_return() {
    DEFERRED_YIELD.store(true, Ordering::SeqCst);
}

/// Consume and clear the deferred-yield flag. The interrupt-exit
/// trampoline (or, in tests, the test itself) calls this to decide
/// whether to reschedule.
pub fn take_deferred_yield() -> bool {
    DEFERRED_YIELD.swap(false, Ordering::SeqCst)
}

/// An RAII guard disabling interrupts for its scope and restoring the
/// previous level on drop, mirroring the teacher's `DisableInterrupts`.
pub struct InterruptGuard {
    previous: IntrLevel,
}

impl InterruptGuard {
    pub fn new() -> Self {
        Self { previous: disable() }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        set_level(self.previous);
    }
}

/// Run `f` with interrupts disabled, restoring the previous level
/// afterward even if `f` panics.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let _guard = InterruptGuard::new();
    f()
}

#[cfg(test)]
static HANDLER_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// Test-only helper: run `f` as though executing inside an interrupt
/// handler (`in_handler()` returns true for its duration).
#[cfg(test)]
pub fn enter_handler_for_test<R>(f: impl FnOnce() -> R) -> R {
    HANDLER_DEPTH.fetch_add(1, Ordering::SeqCst);
    IN_HANDLER.store(true, Ordering::SeqCst);
    let result = f();
    if HANDLER_DEPTH.fetch_sub(1, Ordering::SeqCst) == 1 {
        IN_HANDLER.store(false, Ordering::SeqCst);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_enable_round_trips() {
        enable();
        assert_eq!(get_level(), IntrLevel::Enabled);
        let prev = disable();
        assert_eq!(prev, IntrLevel::Enabled);
        assert_eq!(get_level(), IntrLevel::Disabled);
        set_level(prev);
        assert_eq!(get_level(), IntrLevel::Enabled);
    }

    #[test]
    fn without_interrupts_restores_previous_level() {
        enable();
        without_interrupts(|| {
            assert_eq!(get_level(), IntrLevel::Disabled);
        });
        assert_eq!(get_level(), IntrLevel::Enabled);
    }

    #[test]
    fn deferred_yield_flag_is_consumed_once() {
        assert!(!take_deferred_yield());
        request_yield_on_return();
        assert!(take_deferred_yield());
        assert!(!take_deferred_yield());
    }

    #[test]
    fn handler_context_is_observable() {
        assert!(!in_handler());
        enter_handler_for_test(|| {
            assert!(in_handler());
        });
        assert!(!in_handler());
    }
}
