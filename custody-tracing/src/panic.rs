use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    thread,
};

/// Routes panics through the logging pipeline so they end up next to the
/// request that caused them instead of only on stderr.
pub fn panic_hook(panic_info: &PanicHookInfo) {
    let payload = panic_info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str));

    let location = panic_info.location().map(ToString::to_string);
    let current = thread::current();
    let backtrace = Backtrace::capture();
    let note = (backtrace.status() == BacktraceStatus::Disabled)
        .then_some("run with RUST_BACKTRACE=1 environment variable to display a backtrace");

    tracing::error!(
        panic.payload = message,
        panic.location = location,
        panic.thread = current.name(),
        panic.backtrace = %backtrace,
        panic.note = note,
        "A panic occurred",
    );
}
