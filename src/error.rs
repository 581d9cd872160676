//! Error taxonomy for the fluent front-end.
//!
//! Argument-evaluation failures and ordinary backend failures are recovered
//! close to their origin (see [`crate::logger`]); this module only names the
//! error values that cross an API boundary.

use thiserror::Error;

/// Misuse of the fluent API (`every`/`onAverageEvery`/`atMostEvery` called
/// with an out-of-range argument on a context that isn't forced).
#[derive(Debug, Error)]
pub enum LogContextError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
}

/// Sentinel error a [`crate::backend::LoggerBackend`] can raise from
/// [`crate::backend::LoggerBackend::log`] or
/// [`crate::backend::LoggerBackend::handle_error`] to signal that the failure
/// must propagate to the caller unchanged rather than being swallowed and
/// reported through the last-resort channel.
///
/// Any other error type raised by a backend is treated as "ordinary" and
/// recovered; this one is not.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct LoggingException(pub String);

impl LoggingException {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Error a [`crate::backend::LoggerBackend`] may raise. `Ordinary` is
/// recovered by the last-resort channel; `Sentinel` propagates unchanged.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Sentinel(#[from] LoggingException),
    #[error("{0}")]
    Ordinary(String),
}
