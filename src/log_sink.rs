//! Destinations for the messages emitted by the logging combinators and by
//! fire-and-forget tasks that fault without a handler.
use std::fmt::Display;

pub use log::Level;

/// Receives log lines at a given severity.
///
/// Implemented for [`LogFacade`], which forwards to the [`log`] crate, and for
/// any `Fn(Level, &str)` closure, which is convenient for collecting lines in
/// tests or bridging to a host engine's console.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &dyn Display);
}

/// Forwards to the global [`log`] logger under the `taskflow` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFacade;

impl LogSink for LogFacade {
    fn log(&self, level: Level, message: &dyn Display) {
        log::log!(target: "taskflow", level, "{message}");
    }
}

impl<F> LogSink for F
where
    F: Fn(Level, &str) + Send + Sync,
{
    fn log(&self, level: Level, message: &dyn Display) {
        self(level, &message.to_string());
    }
}
