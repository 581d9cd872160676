//! The platform contract: clock, caller-finder, injected tags/metadata,
//! force-logging policy, and the process-wide log-level map. `SystemPlatform`
//! is the one default wiring this crate ships, so callers never have to
//! hand-assemble one themselves.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use lazy_static::lazy_static;
use log::Level;

use crate::log_level_map::LogLevelMap;
use crate::log_site::LogSite;
use crate::metadata::{MutableMetadata, Tags};

/// Consumed by [`crate::Logger`] and [`crate::context::LogContext`].
pub trait Platform: Send + Sync {
    fn current_time_nanos(&self) -> i64;

    /// Logger-name derivation from the logging class. `SystemPlatform` has no
    /// reflection to draw on, so it returns whatever name the caller already
    /// gave [`crate::Logger`]: `logger_class` *is* the name in this crate.
    fn find_logging_class(&self, logger_class: &'static str) -> &'static str;

    /// Resolves the call site of the *original* caller. Must be annotated
    /// `#[track_caller]` all the way up the call chain for `Location::caller()`
    /// to report the user's call site rather than somewhere inside this crate.
    /// `logger_class` becomes the resolved [`LogSite::class_name`].
    #[track_caller]
    fn find_log_site(&self, logger_class: &'static str) -> LogSite;

    fn should_force_logging(&self, logger_name: &str, level: Level, is_enabled: bool) -> bool;

    /// `None` means `OFF`: no level is enabled for this name.
    fn get_mapped_level(&self, logger_name: &str) -> Option<Level>;

    fn get_injected_tags(&self) -> Tags;

    fn get_injected_metadata(&self) -> MutableMetadata;
}

/// The process default: real clock via `chrono`, no injected tags/metadata,
/// force-logging always `false`, `LogLevelMap` lookup wired to a swappable
/// process-wide map that tests can reconfigure per-case.
pub struct SystemPlatform;

impl Platform for SystemPlatform {
    fn current_time_nanos(&self) -> i64 {
        Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }

    fn find_logging_class(&self, logger_class: &'static str) -> &'static str {
        logger_class
    }

    #[track_caller]
    fn find_log_site(&self, logger_class: &'static str) -> LogSite {
        let loc = std::panic::Location::caller();
        LogSite::new(logger_class, "log", loc.line(), Some(leak_str(loc.file())))
    }

    fn should_force_logging(&self, _logger_name: &str, _level: Level, _is_enabled: bool) -> bool {
        false
    }

    fn get_mapped_level(&self, logger_name: &str) -> Option<Level> {
        GLOBAL_LOG_LEVEL_MAP.load().get_level(logger_name)
    }

    fn get_injected_tags(&self) -> Tags {
        Tags::new()
    }

    fn get_injected_metadata(&self) -> MutableMetadata {
        MutableMetadata::new()
    }
}

/// `Location::file()` is already `'static` in practice (it points at the
/// compiled-in file-path string), but the `panic::Location` API only
/// guarantees the borrow's lifetime, not `'static`; leaking once per distinct
/// file path is cheap and keeps [`LogSite`] fields `&'static str` throughout.
fn leak_str(s: &str) -> &'static str {
    use std::collections::HashSet;
    use std::sync::Mutex;
    lazy_static! {
        static ref SEEN: Mutex<HashSet<&'static str>> = Mutex::new(HashSet::new());
    }
    let mut seen = SEEN.lock().unwrap();
    if let Some(existing) = seen.iter().find(|existing| ***existing == *s) {
        return existing;
    }
    let leaked: &'static str = Box::leak(s.to_string().into_boxed_str());
    seen.insert(leaked);
    leaked
}

lazy_static! {
    /// Swappable at runtime: tests reconfigure log-level policy per-case
    /// without restarting the process.
    pub static ref GLOBAL_LOG_LEVEL_MAP: ArcSwap<LogLevelMap> =
        ArcSwap::new(Arc::new(LogLevelMap::builder(Level::Info).build()));
}

/// Installs a new process-wide [`LogLevelMap`], replacing whatever was there.
pub fn set_log_level_map(map: LogLevelMap) {
    GLOBAL_LOG_LEVEL_MAP.store(Arc::new(map));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_platform_never_forces() {
        let p = SystemPlatform;
        assert!(!p.should_force_logging("x", Level::Error, false));
    }

    #[test]
    fn system_platform_injects_nothing_by_default() {
        let p = SystemPlatform;
        assert_eq!(p.get_injected_tags().0.len(), 0);
        assert_eq!(p.get_injected_metadata().size(), 0);
    }

    #[test]
    fn mapped_level_reflects_installed_map() {
        set_log_level_map(LogLevelMap::builder(Level::Warn).add("app", Level::Trace).unwrap().build());
        let p = SystemPlatform;
        assert_eq!(p.get_mapped_level("app.db"), Some(Level::Trace));
        assert_eq!(p.get_mapped_level("other"), Some(Level::Warn));
        set_log_level_map(LogLevelMap::builder(Level::Info).build());
    }
}
