/*
 * Kernel Logging System
 *
 * A small `log::Log` implementation for the scheduler core. Unlike a
 * full kernel, this crate has no serial port or VGA console of its own
 * to log to — the console/serial device is an external collaborator
 * out of scope for this component — so instead of hardcoding a driver,
 * the logger forwards formatted records through an injected sink that
 * the embedding kernel (or a test harness) installs once at startup.
 *
 * This keeps the same shape as a typical kernel logger (install once,
 * log through the `log` facade everywhere else) while staying free of
 * any particular hardware dependency.
 */

use core::fmt::Arguments;
use core::sync::atomic::{AtomicBool, Ordering};

use log::{Level, LevelFilter, Metadata, Record};
use spin::Mutex;

/// A log sink: given the formatted arguments of a record, write them
/// somewhere (serial port, ring buffer, stdout, ...).
pub type LogSink = fn(Arguments<'_>);

static SINK: Mutex<Option<LogSink>> = Mutex::new(None);
static INSTALLED: AtomicBool = AtomicBool::new(false);

struct CoreLogger;

impl log::Log for CoreLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = *SINK.lock() {
            sink(format_args!("[{}] {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CoreLogger = CoreLogger;

/// Install the logger with the given sink and maximum level.
///
/// Idempotent: calling this more than once only updates the sink, it
/// does not attempt to re-register with the `log` facade (which would
/// fail on the second call).
pub fn init(sink: LogSink, max_level: LevelFilter) {
    *SINK.lock() = Some(sink);

    if !INSTALLED.swap(true, Ordering::SeqCst) {
        log::set_logger(&LOGGER)
            .map(|()| log::set_max_level(max_level))
            .expect("logger already installed by someone else");
    } else {
        log::set_max_level(max_level);
    }
}

/// Replace the default level filter, e.g. to quiet `trace!` spam once
/// boot settles.
pub fn set_level(max_level: LevelFilter) {
    log::set_max_level(max_level);
}

#[cfg(test)]
pub(crate) fn install_test_sink() {
    fn sink(args: Arguments<'_>) {
        std::println!("{}", args);
    }
    init(sink, LevelFilter::Trace);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_receives_formatted_record() {
        install_test_sink();
        log::info!("hello from the scheduler core");
    }
}
