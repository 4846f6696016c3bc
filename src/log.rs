//! Logging tied to simulation time.
//!
//! The `log_*` macros mirror the levels of the [`log`] crate and prefix
//! every record with the current simulation time and the emitting context's
//! name, e.g. `[42.750 car17] starts refueling`.

use colored::Colorize;

use crate::event::{EventId, EventValue, Failure};

/// Formats the standard record prefix: colored simulation time plus context
/// name.
pub fn time_prefix(time: f64, name: &str) -> String {
    let time = format!("{:.3}", time);
    format!("[{} {}]", time.as_str().cyan(), name)
}

/// Serializes an event payload for log records.
pub fn payload_json(value: &EventValue) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unserializable>".to_string())
}

/// Serde-level type name of an event payload, for log records.
pub fn payload_type(value: &EventValue) -> String {
    serde_type_name::type_name(value)
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}

/// Reports a failure whose event was processed with nobody waiting on it.
/// The simulation keeps running: a process failure is local to that process
/// and only observable through its completion event.
pub(crate) fn log_unconsumed_failure(time: f64, event_id: EventId, failure: &Failure) {
    log::error!(
        "[{:.3}] failure of event {} was not consumed by any process: {}",
        time,
        event_id,
        failure
    );
}

/// Logs a message at the info level, prefixed with the simulation time and
/// the name of the given context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => {
        log::info!(
            target: $ctx.name(),
            "{} {}",
            $crate::log::time_prefix($ctx.time(), $ctx.name()),
            format!($($arg)+)
        )
    };
}

/// Logs a message at the debug level, prefixed with the simulation time and
/// the name of the given context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => {
        log::debug!(
            target: $ctx.name(),
            "{} {}",
            $crate::log::time_prefix($ctx.time(), $ctx.name()),
            format!($($arg)+)
        )
    };
}

/// Logs a message at the warn level, prefixed with the simulation time and
/// the name of the given context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => {
        log::warn!(
            target: $ctx.name(),
            "{} {}",
            $crate::log::time_prefix($ctx.time(), $ctx.name()),
            format!($($arg)+)
        )
    };
}

/// Logs a message at the error level, prefixed with the simulation time and
/// the name of the given context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => {
        log::error!(
            target: $ctx.name(),
            "{} {}",
            $crate::log::time_prefix($ctx.time(), $ctx.name()),
            format!($($arg)+)
        )
    };
}

/// Logs a message at the trace level, prefixed with the simulation time and
/// the name of the given context.
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => {
        log::trace!(
            target: $ctx.name(),
            "{} {}",
            $crate::log::time_prefix($ctx.time(), $ctx.name()),
            format!($($arg)+)
        )
    };
}
