//! The six numbered end-to-end scenarios from the seed test list, each its
//! own `#[test]`, driven through `RecordingBackend` and a controllable
//! `Platform` test double so the duration-limiter scenarios don't need real
//! wall-clock sleeps.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use fluent_log::{
    Arg, BackendError, LogData, LogSite, Logger, LoggerBackend, LoggingException, Platform, RecordedEntry,
    RecordingBackend, Tags, TimeUnit,
};
use log::Level;

/// A `Platform` whose clock is advanced manually by the test, and whose log
/// site never varies: the scenarios below are about rate limiting at one
/// fixed call site, not caller resolution.
struct ControllablePlatform {
    now_nanos: AtomicI64,
}

impl ControllablePlatform {
    fn new() -> Self {
        Self { now_nanos: AtomicI64::new(0) }
    }

    fn set_millis(&self, millis: i64) {
        self.now_nanos.store(millis * 1_000_000, Ordering::Relaxed);
    }
}

impl Platform for ControllablePlatform {
    fn current_time_nanos(&self) -> i64 {
        self.now_nanos.load(Ordering::Relaxed)
    }

    fn find_logging_class(&self, logger_class: &'static str) -> &'static str {
        logger_class
    }

    fn find_log_site(&self, logger_class: &'static str) -> LogSite {
        LogSite::new(logger_class, "log", 1, Some("seed_scenarios.rs"))
    }

    fn should_force_logging(&self, _logger_name: &str, _level: Level, _is_enabled: bool) -> bool {
        false
    }

    fn get_mapped_level(&self, _logger_name: &str) -> Option<Level> {
        Some(Level::Trace)
    }

    fn get_injected_tags(&self) -> Tags {
        Tags::new()
    }

    fn get_injected_metadata(&self) -> fluent_log::MutableMetadata {
        fluent_log::MutableMetadata::new()
    }
}

fn logged_skips(backend: &RecordingBackend) -> Vec<(usize, Option<usize>)> {
    backend
        .entries()
        .into_iter()
        .enumerate()
        .filter_map(|(i, e)| match e {
            RecordedEntry::Logged(snap) => Some((i, snap.skipped_log_count)),
            RecordedEntry::Errored(_) => None,
        })
        .collect()
}

#[test]
fn scenario_1_every_5_over_11_observations() {
    let backend = Arc::new(RecordingBackend::new("s1"));
    let platform = Arc::new(ControllablePlatform::new());
    let logger = Logger::with_platform("s1", backend.clone(), platform);

    for i in 0..11u32 {
        logger.at(Level::Info).every(5).log_fmt("observation {}", vec![Arg::U64(i as u64)]);
    }

    let seen = logged_skips(&backend);
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].1, None);
    assert_eq!(seen[1].1, Some(4));
    assert_eq!(seen[2].1, Some(4));
}

#[test]
fn scenario_2_every_15_at_most_every_2s_over_100ms_steps() {
    let backend = Arc::new(RecordingBackend::new("s2"));
    let platform = Arc::new(ControllablePlatform::new());
    let logger = Logger::with_platform("s2", backend.clone(), platform.clone());

    let mut emitted_at = Vec::new();
    for i in 0..61u32 {
        platform.set_millis(i as i64 * 100);
        let before = backend.len();
        logger.at(Level::Info).every(15).at_most_every(2, TimeUnit::Seconds).log_fmt("tick {}", vec![Arg::U64(i as u64)]);
        if backend.len() > before {
            emitted_at.push(i);
        }
    }

    assert_eq!(emitted_at, vec![0, 20, 40, 60]);
}

#[test]
fn scenario_3_every_15_at_most_every_1s_over_100ms_steps() {
    let backend = Arc::new(RecordingBackend::new("s3"));
    let platform = Arc::new(ControllablePlatform::new());
    let logger = Logger::with_platform("s3", backend.clone(), platform.clone());

    let mut emitted_at = Vec::new();
    for i in 0..61u32 {
        platform.set_millis(i as i64 * 100);
        let before = backend.len();
        logger.at(Level::Info).every(15).at_most_every(1, TimeUnit::Seconds).log_fmt("tick {}", vec![Arg::U64(i as u64)]);
        if backend.len() > before {
            emitted_at.push(i);
        }
    }

    assert_eq!(emitted_at, vec![0, 15, 30, 45, 60]);
}

#[test]
fn scenario_4_grouped_by_exception_class_at_most_every_1s() {
    let backend = Arc::new(RecordingBackend::new("s4"));
    let platform = Arc::new(ControllablePlatform::new());
    let logger = Logger::with_platform("s4", backend.clone(), platform.clone());

    let classes = ["IllegalArgumentException", "NullPointerException", "NullPointerException", "IllegalArgumentException"];
    for (i, class) in classes.iter().enumerate() {
        platform.set_millis(i as i64 * 100);
        logger.at(Level::Error).per(Some(class.to_string())).at_most_every(1, TimeUnit::Seconds).log(*class);
    }

    let seen = logged_skips(&backend);
    assert_eq!(seen.len(), 2);
}

/// A backend that always raises the sentinel [`LoggingException`] from
/// `log()`. Unlike `RecordingBackend`, it records nothing on the way in:
/// there is nothing to record, since this is what a real sink throwing from
/// its write path looks like.
struct SentinelBackend;

impl LoggerBackend for SentinelBackend {
    fn logger_name(&self) -> &str {
        "sentinel"
    }

    fn is_loggable(&self, _level: Level) -> bool {
        true
    }

    fn log(&self, _data: &LogData) -> Result<(), BackendError> {
        Err(BackendError::Sentinel(LoggingException::new("sink is closed")))
    }

    fn handle_error(&self, _error: &(dyn std::error::Error + Send + Sync), _bad_data: &LogData) -> Result<(), BackendError> {
        Ok(())
    }
}

#[test]
fn scenario_5_sentinel_exception_propagates_and_records_nothing() {
    let backend = Arc::new(SentinelBackend);
    let logger = Logger::new("s5", backend);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        logger.at(Level::Error).log("about to fail");
    }));

    assert!(result.is_err());
    let payload = result.unwrap_err();
    let exception = payload.downcast_ref::<LoggingException>().expect("panic payload should be the sentinel");
    assert_eq!(exception.0, "sink is closed");
}

#[test]
fn scenario_6_panicking_argument_yields_zero_log_entries_and_one_error_report() {
    let backend = Arc::new(RecordingBackend::new("s6"));
    let logger = Logger::new("s6", backend.clone());

    logger.at(Level::Error).log_fmt("bad: {}", vec![Arg::Lazy(Box::new(|| panic!("NullPointerException: boom")))]);

    let entries = backend.entries();
    let logged = entries.iter().filter(|e| matches!(e, RecordedEntry::Logged(_))).count();
    let errored: Vec<&RecordedEntry> = entries.iter().filter(|e| matches!(e, RecordedEntry::Errored(_))).collect();
    assert_eq!(logged, 0);
    assert_eq!(errored.len(), 1);
    if let RecordedEntry::Errored(msg) = errored[0] {
        assert!(msg.contains("NullPointerException"));
    }
}
