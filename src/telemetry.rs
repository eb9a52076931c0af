//! Structured-event sink (spec §6: "an abstract consumer, no specific
//! format mandated").
//!
//! The reactor, connection state machine, timer service and file cache never
//! call a logging macro directly — they emit [`Event`]s through whatever
//! [`Sink`] the binary wired up. This keeps logging an external collaborator
//! the way spec.md §1 requires, while still giving the default binary a real
//! backend instead of a hand-rolled one: [`TracingSink`] forwards every
//! event to the `tracing` crate, so `RUST_LOG`/`tracing-subscriber` filtering
//! and formatting apply unchanged.

use std::fmt;
use std::panic::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

pub struct Event<'a> {
    pub level: Level,
    pub message: fmt::Arguments<'a>,
    pub location: &'static Location<'static>,
}

/// Injectable consumer of structured events. Implementations must not block
/// the caller for long — the reactor thread and worker threads both emit
/// through this trait.
pub trait Sink: Send + Sync {
    fn emit(&self, event: Event<'_>);

    /// Fast pre-filter so callers can skip building the `Arguments` entirely
    /// (the `log!` macro below checks this before formatting).
    fn enabled(&self, level: Level) -> bool {
        let _ = level;
        true
    }
}

/// Default sink: forwards to the `tracing` crate at the matching level.
pub struct TracingSink {
    pub min_level: Level,
}

impl Sink for TracingSink {
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn emit(&self, event: Event<'_>) {
        let loc = event.location;
        match event.level {
            Level::Trace => tracing::trace!(file = loc.file(), line = loc.line(), "{}", event.message),
            Level::Debug => tracing::debug!(file = loc.file(), line = loc.line(), "{}", event.message),
            Level::Info => tracing::info!(file = loc.file(), line = loc.line(), "{}", event.message),
            Level::Warn => tracing::warn!(file = loc.file(), line = loc.line(), "{}", event.message),
            Level::Error => tracing::error!(file = loc.file(), line = loc.line(), "{}", event.message),
        }
    }
}

/// A sink that drops everything; used by tests that don't care about
/// telemetry output.
pub struct NullSink;

impl Sink for NullSink {
    fn enabled(&self, _level: Level) -> bool {
        false
    }
    fn emit(&self, _event: Event<'_>) {}
}

#[macro_export]
macro_rules! log {
    ($sink:expr, $level:expr, $($arg:tt)*) => {{
        let level = $level;
        if $sink.enabled(level) {
            $sink.emit($crate::telemetry::Event {
                level,
                message: format_args!($($arg)*),
                location: std::panic::Location::caller(),
            });
        }
    }};
}

#[macro_export]
macro_rules! trace { ($sink:expr, $($arg:tt)*) => { $crate::log!($sink, $crate::telemetry::Level::Trace, $($arg)*) }; }
#[macro_export]
macro_rules! debug { ($sink:expr, $($arg:tt)*) => { $crate::log!($sink, $crate::telemetry::Level::Debug, $($arg)*) }; }
#[macro_export]
macro_rules! info { ($sink:expr, $($arg:tt)*) => { $crate::log!($sink, $crate::telemetry::Level::Info, $($arg)*) }; }
#[macro_export]
macro_rules! warn { ($sink:expr, $($arg:tt)*) => { $crate::log!($sink, $crate::telemetry::Level::Warn, $($arg)*) }; }
#[macro_export]
macro_rules! error { ($sink:expr, $($arg:tt)*) => { $crate::log!($sink, $crate::telemetry::Level::Error, $($arg)*) }; }

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);
    impl Sink for CountingSink {
        fn emit(&self, _event: Event<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn macro_emits_through_sink() {
        let sink = CountingSink(AtomicUsize::new(0));
        crate::info!(sink, "connection {} accepted", 7);
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_sink_is_disabled_for_every_level() {
        let sink = NullSink;
        assert!(!sink.enabled(Level::Error));
    }
}
