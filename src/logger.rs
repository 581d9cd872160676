//! [`Logger`]: the fluent API's entry point. Chooses a [`crate::context::LoggingApi`]
//! instance for `at(level)`, guards backend dispatch against runaway
//! recursion, and owns the last-resort error channel.

use std::cell::Cell;
use std::sync::Arc;

use chrono::Utc;
use log::Level;

use crate::backend::LoggerBackend;
use crate::context::LoggingApi;
use crate::error::BackendError;
use crate::log_data::LogData;
use crate::platform::{Platform, SystemPlatform};

/// Logging of the current call is aborted once the calling thread's
/// recursion depth would exceed this, and a single diagnostic line is
/// emitted instead.
const MAX_ALLOWED_DEPTH: u32 = 100;

thread_local! {
    static RECURSION_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Bumps the per-thread recursion counter for the lifetime of one backend
/// dispatch; decrements on drop so a panicking backend call still unwinds
/// the counter correctly.
struct DepthGuard;

impl DepthGuard {
    /// `None` if depth is already at the limit: the caller should abort.
    fn enter() -> Option<Self> {
        RECURSION_DEPTH.with(|depth| {
            let cur = depth.get();
            if cur >= MAX_ALLOWED_DEPTH {
                None
            } else {
                depth.set(cur + 1);
                Some(DepthGuard)
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        RECURSION_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// State shared by every [`crate::context::LogContext`] a given `Logger`
/// produces. Cheap to clone (one `Arc` bump) since a fresh context borrows
/// it for the duration of exactly one terminal call.
pub(crate) struct LoggerInner {
    pub(crate) name: &'static str,
    pub(crate) backend: Arc<dyn LoggerBackend>,
    pub(crate) platform: Arc<dyn Platform>,
}

/// `logger.at(Level::Info).with(...).log(...)`: the whole front-end in one
/// handle. Construct one per logical logger name (typically a module or
/// component); it is cheap to hold onto and safe to share across threads.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    /// A logger wired to the process-default [`SystemPlatform`].
    pub fn new(name: &'static str, backend: Arc<dyn LoggerBackend>) -> Self {
        Self::with_platform(name, backend, Arc::new(SystemPlatform))
    }

    /// A logger wired to an explicit platform. Tests use this to inject a
    /// controllable clock and force-logging policy.
    pub fn with_platform(name: &'static str, backend: Arc<dyn LoggerBackend>, platform: Arc<dyn Platform>) -> Self {
        Self { inner: Arc::new(LoggerInner { name, backend, platform }) }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// The cheap enabled check: a `LogLevelMap` lookup of `OFF`
    /// (`get_mapped_level` returning `None`) always wins and yields the
    /// no-op API regardless of backend or force-logging policy. Otherwise a
    /// context is built when the backend reports the level loggable, or the
    /// platform's force-logging policy says yes.
    #[track_caller]
    pub fn at(&self, level: Level) -> LoggingApi {
        match self.inner.platform.get_mapped_level(self.inner.name) {
            None => LoggingApi::disabled(),
            Some(mapped) => {
                let enabled_by_backend = level <= mapped && self.inner.backend.is_loggable(level);
                let forced = self.inner.platform.should_force_logging(self.inner.name, level, enabled_by_backend);
                if enabled_by_backend || forced {
                    LoggingApi::enabled(self.inner.clone(), level, forced && !enabled_by_backend)
                } else {
                    LoggingApi::disabled()
                }
            }
        }
    }

    /// Unconditionally builds a context, bypassing the enabled check
    /// entirely. The resulting context's metadata carries `WAS_FORCED=true`
    /// and its rate-limiter modifiers become no-ops ("forced logging").
    #[track_caller]
    pub fn force_at(&self, level: Level) -> LoggingApi {
        LoggingApi::enabled(self.inner.clone(), level, true)
    }
}

/// Guards one whole terminal call, including any nested logging a lazy
/// argument's evaluation triggers, against runaway recursion.
/// The guard must be held for the pipeline's full duration, not just the
/// final backend dispatch: a thunk that itself logs recurses through
/// another full `run_pipeline`, deepening the call stack well before
/// [`LoggerInner::write`] is ever reached, so checking only there would
/// never trip before a real stack overflow did.
pub(crate) fn enter_call(logger_name: &str) -> Option<DepthGuard> {
    match DepthGuard::enter() {
        Some(guard) => Some(guard),
        None => {
            last_resort(logger_name, "log", "unbounded recursion in log statement");
            None
        }
    }
}

impl LoggerInner {
    /// Forwards to the backend. An ordinary error is swallowed and reported
    /// through the last-resort channel; the sentinel
    /// [`crate::error::LoggingException`] propagates to the caller by
    /// panicking with the error value attached. Rust has no checked
    /// exceptions, so an unwind is the closest equivalent of "rethrow
    /// unmodified"; a caller that wants to observe it can `catch_unwind`
    /// and downcast the payload.
    pub(crate) fn write(&self, data: &LogData) {
        match self.backend.log(data) {
            Ok(()) => {}
            Err(BackendError::Sentinel(e)) => std::panic::panic_any(e),
            Err(BackendError::Ordinary(msg)) => last_resort(self.name, "log", &format!("logging error: {msg}")),
        }
    }

    /// Reports an argument-evaluation failure to the backend's
    /// `handle_error` hook; only if that itself fails do we fall through to
    /// the last-resort channel.
    pub(crate) fn handle_error(&self, error: &(dyn std::error::Error + Send + Sync), bad_data: &LogData) {
        match self.backend.handle_error(error, bad_data) {
            Ok(()) => {}
            Err(BackendError::Sentinel(e)) => std::panic::panic_any(e),
            Err(BackendError::Ordinary(msg)) => last_resort(self.name, "log", &format!("logging error: {msg}")),
        }
    }
}

/// The one process-wide text sink: `<ISO-8601 timestamp>: <message>`,
/// where `<message>` names the logging class/method and the phase.
pub(crate) fn last_resort(logger_name: &str, method: &str, message: &str) {
    let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    eprintln!("{ts}: {logger_name}.{method}: {message}");
}
