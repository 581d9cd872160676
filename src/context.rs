//! The fluent front-end's state machine: accumulate modifiers on a
//! single-use [`LogContext`], then drive the post-processing pipeline on the
//! terminal `log` call and dispatch exactly once.
//!
//! `LoggingApi` is the public-facing handle returned by `Logger::at`. It is a
//! plain enum rather than a trait object on purpose: the disabled branch
//! carries no payload, so every modifier call on a disabled chain is a
//! single match with nothing to allocate.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use log::Level;

use crate::error::LogContextError;
use crate::log_data::{Arg, LogData, Message, RenderedMessage};
use crate::log_site::{LogSite, LogSiteKey, Qualifier, SiteKeyHandle, SpecializedLogSiteKey};
use crate::logger::LoggerInner;
use crate::metadata::{
    Cause, GroupingKey, MetadataKey, MutableMetadata, StackSize, CONTEXT_STACK_SIZE, LOG_AT_MOST_EVERY, LOG_CAUSE,
    LOG_EVERY_N, LOG_SAMPLE_EVERY_N, LOG_SITE_GROUPING_KEY, SKIPPED_LOG_COUNT, TAGS, WAS_FORCED,
};
use crate::rate_limit::{RateLimitStatus, RATE_LIMITERS};
use crate::scope::{LoggingScope, ScopeProvider};

/// A single-use, non-thread-safe accumulator for one log statement's
/// modifiers. Consumed by exactly one terminal `log` call.
pub struct LogContext {
    logger: Arc<LoggerInner>,
    level: Level,
    forced: bool,
    metadata: MutableMetadata,
    injected_log_site: Option<LogSite>,
}

/// The value `Logger::at` / `Logger::force_at` return: either a live context
/// or the disabled no-op. Every modifier consumes `self` and returns `Self`
/// so calls chain; on the disabled branch they are all free.
pub enum LoggingApi {
    Enabled(LogContext),
    Disabled,
}

impl LoggingApi {
    pub(crate) fn enabled(logger: Arc<LoggerInner>, level: Level, forced: bool) -> Self {
        let mut metadata = logger.platform.get_injected_metadata();
        if forced {
            metadata.add(&WAS_FORCED, true);
        }
        LoggingApi::Enabled(LogContext { logger, level, forced, metadata, injected_log_site: None })
    }

    pub(crate) fn disabled() -> Self {
        LoggingApi::Disabled
    }

    /// Whether this chain will actually reach the backend. Mirrors the
    /// contexts' own `at(level)` decision; mostly useful to skip building
    /// expensive arguments ahead of a call that will no-op anyway.
    pub fn is_enabled(&self) -> bool {
        matches!(self, LoggingApi::Enabled(_))
    }

    fn map(self, f: impl FnOnce(LogContext) -> LogContext) -> Self {
        match self {
            LoggingApi::Enabled(ctx) => LoggingApi::Enabled(f(ctx)),
            LoggingApi::Disabled => LoggingApi::Disabled,
        }
    }

    /// Adds a cause. Equivalent to `with(LOG_CAUSE, Some(cause))`.
    pub fn with_cause<E: std::error::Error + Send + Sync + 'static>(self, cause: E) -> Self {
        let cause: Cause = Arc::new(cause);
        self.map(move |mut ctx| {
            ctx.metadata.add(&LOG_CAUSE, cause);
            ctx
        })
    }

    /// Adds metadata under `key`. `None` is a no-op (the "null value"
    /// case, since Rust has no null to smuggle through a generic `T`).
    pub fn with<T: Send + Sync + 'static>(self, key: &'static MetadataKey<T>, value: Option<T>) -> Self {
        self.map(move |mut ctx| {
            if let Some(v) = value {
                ctx.metadata.add(key, v);
            }
            ctx
        })
    }

    /// Shorthand for `with(key, Some(true))`.
    pub fn with_flag(self, key: &'static MetadataKey<bool>) -> Self {
        self.with(key, Some(true))
    }

    /// `every(n)`: emits on the 1st, nth, 2nth, ... observation at this
    /// (possibly specialized) log site. `n == 1` is equivalent to logging
    /// every time, so no metadata (and no limiter state) is needed. Panics
    /// if `n <= 0` and the context is not forced (a forced context suppresses
    /// the check entirely).
    pub fn every(self, n: i32) -> Self {
        self.map(move |mut ctx| {
            if n <= 0 {
                if !ctx.forced {
                    panic!("{}", LogContextError::IllegalArgument(format!("every(n): n must be > 0, got {n}")));
                }
            } else if n > 1 {
                ctx.metadata.add(&LOG_EVERY_N, n as u32);
            }
            ctx
        })
    }

    /// `onAverageEvery(n)`: samples roughly 1-in-`n` observations. Same
    /// validation rules as [`Self::every`].
    pub fn on_average_every(self, n: i32) -> Self {
        self.map(move |mut ctx| {
            if n <= 0 {
                if !ctx.forced {
                    panic!("{}", LogContextError::IllegalArgument(format!("onAverageEvery(n): n must be > 0, got {n}")));
                }
            } else if n > 1 {
                ctx.metadata.add(&LOG_SAMPLE_EVERY_N, n as u32);
            }
            ctx
        })
    }

    /// `atMostEvery(n, unit)`: at most one emission per `n` units of wall
    /// time. `n == 0` is a no-op; `n < 0` panics unless forced.
    pub fn at_most_every(self, n: i64, unit: crate::rate_limit::TimeUnit) -> Self {
        self.map(move |mut ctx| {
            if n < 0 {
                if !ctx.forced {
                    panic!("{}", LogContextError::IllegalArgument(format!("atMostEvery(n): n must be >= 0, got {n}")));
                }
            } else if n > 0 {
                ctx.metadata.add(&LOG_AT_MOST_EVERY, crate::rate_limit::RateLimitPeriod::new(n as u64, unit));
            }
            ctx
        })
    }

    /// `per(key, value)`: adds one repeated grouping-key entry. `None` is a
    /// no-op.
    pub fn per<Q: Qualifier>(self, qualifier: Option<Q>) -> Self {
        match qualifier {
            Some(q) => self.map(move |mut ctx| {
                ctx.metadata.add(&LOG_SITE_GROUPING_KEY, GroupingKey::Value(Arc::new(q)));
                ctx
            }),
            None => self,
        }
    }

    /// `per(scope)`: groups by a [`LoggingScope`] directly, using its
    /// `specialize()` instead of a raw qualifier wrap. The log-site state
    /// becomes eligible for removal once the scope closes.
    pub fn per_scope(self, scope: LoggingScope) -> Self {
        self.map(move |mut ctx| {
            ctx.metadata.add(&LOG_SITE_GROUPING_KEY, GroupingKey::Scope(scope));
            ctx
        })
    }

    /// `per(scope_provider)`: resolves the provider's current scope and
    /// groups by it.
    pub fn per_scope_provider(self, provider: &dyn ScopeProvider) -> Self {
        self.per_scope(provider.get_scope())
    }

    /// `withStackTrace(size)`. `None` is a no-op.
    pub fn with_stack_trace(self, size: Option<StackSize>) -> Self {
        match size {
            Some(s) => self.map(move |mut ctx| {
                ctx.metadata.add(&CONTEXT_STACK_SIZE, s);
                ctx
            }),
            None => self,
        }
    }

    /// `withInjectedLogSite(site)`. First non-null wins: a prior injection
    /// (including `LogSite::INVALID`) is sticky.
    pub fn with_injected_log_site(self, site: LogSite) -> Self {
        self.map(move |mut ctx| {
            if ctx.injected_log_site.is_none() {
                ctx.injected_log_site = Some(site);
            }
            ctx
        })
    }

    /// `log(message)`: a literal message (the `Message::Literal` branch).
    /// Raw `%`/`{}` sequences are never interpreted.
    #[track_caller]
    pub fn log(self, message: impl Into<Cow<'static, str>>) {
        self.terminal(Message::Literal(message.into()));
    }

    /// `log()`: the bare terminal call, equivalent to logging an empty
    /// literal message.
    #[track_caller]
    pub fn log_unit(self) {
        self.terminal(Message::Literal(Cow::Borrowed("")));
    }

    /// `log(template, args...)`: a template plus positional arguments,
    /// evaluated during post-processing (lazy thunks run exactly once, on
    /// this thread).
    #[track_caller]
    pub fn log_fmt(self, template: &'static str, args: Vec<Arg>) {
        self.terminal(Message::Template { template, args });
    }

    /// The deliberate `log(null, null)` edge case: a missing message *and* a
    /// missing sole argument still panics, exactly as upstream. A missing
    /// message with a present argument falls back to the `"<null>"` sentinel
    /// as the template text.
    #[track_caller]
    pub fn log_nullable(self, message: Option<&'static str>, sole_arg: Option<Arg>) {
        if message.is_none() && matches!(sole_arg, None | Some(Arg::Null)) {
            panic!("log(null, null): a log statement needs at least a message or a non-null argument");
        }
        match (message, sole_arg) {
            (Some(msg), None) => self.terminal(Message::Literal(Cow::Borrowed(msg))),
            (msg, Some(arg)) => {
                let template = msg.unwrap_or(Message::NULL_SENTINEL);
                self.terminal(Message::Template { template, args: vec![arg] });
            }
            (None, None) => unreachable!("handled by the panic above"),
        }
    }

    #[track_caller]
    fn terminal(self, message: Message) {
        if let LoggingApi::Enabled(ctx) = self {
            // Held for the whole pipeline, not just the final backend
            // dispatch: argument evaluation below may itself log.
            if let Some(_guard) = crate::logger::enter_call(ctx.logger.name) {
                ctx.run_pipeline(message);
            }
        }
    }
}

/// A formatting failure from a lazy argument, reported to
/// [`crate::backend::LoggerBackend::handle_error`].
#[derive(Debug)]
struct ArgEvalError(String);

impl fmt::Display for ArgEvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ArgEvalError {}

/// The synthetic cause `withStackTrace` installs in place of (or wrapping)
/// any prior `LOG_CAUSE`: its message is the stack-size enum's name, and its
/// `source()` is whatever cause was there before.
#[derive(Debug)]
struct StackTraceCapture {
    size_name: &'static str,
    trace: String,
    source: Option<Cause>,
}

impl fmt::Display for StackTraceCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.size_name)?;
        write!(f, "{}", self.trace)
    }
}

impl std::error::Error for StackTraceCapture {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

fn format_backtrace(bt: &backtrace::Backtrace, max_depth: Option<usize>) -> String {
    let full = format!("{bt:?}");
    // Skip the frames belonging to this crate's own pipeline
    // (capture_stack / run_pipeline / terminal) rather than the caller's.
    let mut lines: Vec<&str> = full.lines().skip(3).collect();
    if let Some(limit) = max_depth {
        lines.truncate(limit);
    }
    lines.join("\n")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Evaluates every lazy argument in `message` exactly once. Any panic raised
/// by a thunk (the Rust stand-in for a `toString` that throws) is caught and
/// turned into an error plus the partially-evaluated message, so the caller
/// can still assemble a `bad_data` snapshot for `handle_error`.
fn evaluate_message(message: Message) -> Result<RenderedMessage, (String, RenderedMessage)> {
    match message {
        Message::Literal(s) => Ok(RenderedMessage::Literal(s)),
        Message::Template { template, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for (index, arg) in args.into_iter().enumerate() {
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || arg.evaluate())) {
                    Ok(value) => evaluated.push(value),
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        let partial = RenderedMessage::Template { template, args: evaluated };
                        return Err((format!("argument {index} evaluation failed: {msg}"), partial));
                    }
                }
            }
            Ok(RenderedMessage::Template { template, args: evaluated })
        }
    }
}

impl LogContext {
    /// Runs the post-processing pipeline and, if the combined rate-limit
    /// status allows it, dispatches to the backend.
    #[track_caller]
    fn run_pipeline(mut self, message: Message) {
        // 1. Resolve the log site. Called directly rather than from a
        // closure: `find_log_site` relies on `#[track_caller]` to see the
        // user's call site, and closures are never `#[track_caller]`, so
        // moving this behind `unwrap_or_else(|| ...)` would collapse every
        // log statement sharing a logger onto one location.
        let site = match self.injected_log_site.clone() {
            Some(s) => s,
            None => self.logger.platform.find_log_site(self.logger.name),
        };

        // 2. Specialize the key: walk LOG_SITE_GROUPING_KEY entries in
        // order, wrapping as we go. Order is observable.
        let mut current: Arc<dyn LogSiteKey> = Arc::new(site.clone());
        for grouping in self.metadata.find_all(&LOG_SITE_GROUPING_KEY) {
            current = match grouping {
                GroupingKey::Scope(scope) => Arc::new(scope.specialize(current)),
                GroupingKey::Value(qualifier) => Arc::new(SpecializedLogSiteKey::of(current, qualifier)),
            };
        }
        let key = SiteKeyHandle::new(current);

        // 3. Rate limiters, fixed order (Duration, Counting, Sampling),
        // combined into one status.
        let now_nanos = self.logger.platform.current_time_nanos();
        let status = RATE_LIMITERS.combined_status(&key, &self.metadata.view(), now_nanos);

        // 4/5. Stack-trace capture only matters if we are not about to
        // discard this observation outright.
        let will_disallow = matches!(status, Some(RateLimitStatus::Disallow));
        if !will_disallow {
            if let Some(size) = self.metadata.find_value(&CONTEXT_STACK_SIZE).copied() {
                self.metadata.remove_all(&*CONTEXT_STACK_SIZE);
                self.capture_stack(size);
            }
        }

        // 6. Check status, reset on success, compute the skipped count.
        let skipped = RATE_LIMITERS.check_and_clear_skips(status, &key, &self.metadata.view());
        if skipped < 0 {
            return;
        }
        if skipped > 0 {
            self.metadata.add(&SKIPPED_LOG_COUNT, skipped as usize);
        }

        // 7/8. Evaluate lazy arguments; assemble the rendered message.
        let rendered = match evaluate_message(message) {
            Ok(rendered) => rendered,
            Err((err_msg, partial)) => {
                let bad_data = LogData {
                    level: self.level,
                    timestamp_nanos: now_nanos,
                    logger_name: self.logger.name,
                    log_site: site,
                    metadata: MutableMetadata::new(),
                    message: partial,
                    was_forced: self.forced,
                };
                self.logger.handle_error(&ArgEvalError(err_msg), &bad_data);
                return;
            }
        };

        // 9. Merge injected tags with any log-site TAGS metadata.
        let injected_tags = self.logger.platform.get_injected_tags();
        if !injected_tags.0.is_empty() {
            let mut merged = injected_tags;
            if let Some(existing) = self.metadata.find_value(&TAGS) {
                merged.merge(existing);
            }
            self.metadata.add(&TAGS, merged);
        }

        let data = LogData {
            level: self.level,
            timestamp_nanos: now_nanos,
            logger_name: self.logger.name,
            log_site: site,
            metadata: self.metadata,
            message: rendered,
            was_forced: self.forced,
        };

        // 10. Dispatch.
        self.logger.write(&data);
    }

    fn capture_stack(&mut self, size: StackSize) {
        let bt = backtrace::Backtrace::new();
        let trace = format_backtrace(&bt, size.max_depth());
        let previous_cause = self.metadata.find_value(&LOG_CAUSE).cloned();
        let capture: Cause = Arc::new(StackTraceCapture { size_name: size.name(), trace, source: previous_cause });
        self.metadata.add(&LOG_CAUSE, capture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::platform::SystemPlatform;

    fn test_logger(name: &'static str) -> (crate::logger::Logger, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new(name));
        let logger = crate::logger::Logger::with_platform(name, backend.clone(), Arc::new(SystemPlatform));
        (logger, backend)
    }

    #[test]
    fn forced_context_carries_was_forced_and_ignores_rate_limit_misuse() {
        let (logger, backend) = test_logger("ctx.forced");
        logger.force_at(Level::Debug).every(-3).log("hi");
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn disabled_chain_never_reaches_backend() {
        crate::platform::set_log_level_map(crate::log_level_map::LogLevelMap::builder(Level::Error).build());
        let (logger, backend) = test_logger("ctx.disabled");
        logger.at(Level::Debug).every(-3).log("never");
        assert!(backend.is_empty());
        crate::platform::set_log_level_map(crate::log_level_map::LogLevelMap::builder(Level::Info).build());
    }

    #[test]
    #[should_panic(expected = "every(n)")]
    fn every_zero_panics_when_not_forced() {
        let (logger, _backend) = test_logger("ctx.panic");
        logger.at(Level::Error).every(0).log("boom");
    }

    #[test]
    fn null_message_and_null_argument_panics() {
        let (logger, _backend) = test_logger("ctx.null");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            logger.at(Level::Error).log_nullable(None, None);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn argument_panic_reports_via_handle_error_not_backend_log() {
        let (logger, backend) = test_logger("ctx.argpanic");
        logger.at(Level::Error).log_fmt("{}", vec![Arg::Lazy(Box::new(|| panic!("bad arg")))]);
        let entries = backend.entries();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], crate::backend::RecordedEntry::Errored(_)));
    }
}
