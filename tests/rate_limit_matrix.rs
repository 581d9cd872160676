//! Parametrized rate-limiter coverage using `#[rstest]`-per-case cases.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use fluent_log::{Arg, LogSite, Logger, Platform, RecordedEntry, RecordingBackend, Tags, TimeUnit};
use log::Level;
use rstest::rstest;

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
        LogSite::new(logger_class, "log", 1, Some("rate_limit_matrix.rs"))
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

fn logged_count(backend: &RecordingBackend) -> usize {
    backend.entries().into_iter().filter(|e| matches!(e, RecordedEntry::Logged(_))).count()
}

/// For `every(n)` over `observations` calls at one fixed log site, the number
/// of emissions is `ceil(observations / n)`: one at index 0, then every `n`th
/// thereafter.
#[rstest]
#[case(2, 10, 5)]
#[case(3, 10, 4)]
#[case(5, 11, 3)]
#[case(7, 7, 1)]
#[case(1, 4, 4)]
fn every_n_emission_count(#[case] n: i32, #[case] observations: u32, #[case] expected_emissions: usize) {
    let backend = Arc::new(RecordingBackend::new("matrix"));
    let logger = Logger::with_platform("matrix.every", backend.clone(), Arc::new(ControllablePlatform::new()));
    for i in 0..observations {
        logger.at(Level::Info).every(n).log_fmt("obs {}", vec![Arg::U64(i as u64)]);
    }
    assert_eq!(logged_count(&backend), expected_emissions);
}

/// `atMostEvery(n, unit)` at fixed 100ms steps over a 6s window emits once at
/// t=0 and thereafter at the first step whose timestamp clears the period.
#[rstest]
#[case(500, TimeUnit::Millis, 13)]
#[case(1, TimeUnit::Seconds, 7)]
#[case(2, TimeUnit::Seconds, 4)]
#[case(3, TimeUnit::Seconds, 3)]
fn at_most_every_emission_count_over_6s(#[case] n: i64, #[case] unit: TimeUnit, #[case] expected_emissions: usize) {
    let backend = Arc::new(RecordingBackend::new("matrix"));
    let platform = Arc::new(ControllablePlatform::new());
    let logger = Logger::with_platform("matrix.duration", backend.clone(), platform.clone());
    for i in 0..61u32 {
        platform.set_millis(i as i64 * 100);
        logger.at(Level::Info).at_most_every(n, unit).log_fmt("tick {}", vec![Arg::U64(i as u64)]);
    }
    assert_eq!(logged_count(&backend), expected_emissions);
}

/// `n <= 0` disables `every`/`onAverageEvery` entirely on a forced context
/// (no panic, no limiter state, every observation emits).
#[rstest]
#[case(0)]
#[case(-1)]
#[case(-100)]
fn forced_context_ignores_non_positive_every_n(#[case] n: i32) {
    let backend = Arc::new(RecordingBackend::new("matrix"));
    let logger = Logger::with_platform("matrix.forced", backend.clone(), Arc::new(ControllablePlatform::new()));
    for _ in 0..3 {
        logger.force_at(Level::Debug).every(n).log("heartbeat");
    }
    assert_eq!(logged_count(&backend), 3);
}
