//! The backend contract: consumed, never implemented for a real sink in
//! this crate. A pluggable, boxed trait object the core dispatches to
//! without knowing anything about I/O.

use log::Level;

use crate::error::BackendError;
use crate::log_data::LogData;

/// Consumed by [`crate::Logger`] when a terminal log call dispatches. A
/// concrete backend (file/console/syslog sink, not part of this crate)
/// implements this.
pub trait LoggerBackend: Send + Sync {
    fn logger_name(&self) -> &str;

    fn is_loggable(&self, level: Level) -> bool;

    /// Called at most once per terminal log call. An `Err` carrying the
    /// sentinel [`crate::error::LoggingException`] propagates to the caller
    /// unchanged; any other error triggers the last-resort channel.
    fn log(&self, data: &LogData) -> Result<(), BackendError>;

    /// Called when argument formatting (a lazy thunk) fails. `bad_data` is
    /// whatever partial `LogData` had been assembled so far.
    fn handle_error(&self, error: &(dyn std::error::Error + Send + Sync), bad_data: &LogData) -> Result<(), BackendError>;
}

/// An in-tree test double: records every [`LogData`] it receives instead of
/// doing I/O. Not a production sink (used only by this crate's own tests to
/// exercise the pipeline end to end).
pub struct RecordingBackend {
    name: &'static str,
    records: parking_lot::Mutex<Vec<RecordedEntry>>,
}

/// A captured `log()` or `handle_error()` invocation, for test assertions.
pub enum RecordedEntry {
    Logged(LogDataSnapshot),
    Errored(String),
}

/// The bits of [`LogData`] worth asserting on in tests; `LogData` itself
/// isn't `Clone` (it owns lazy-evaluated metadata and a one-shot message).
pub struct LogDataSnapshot {
    pub level: Level,
    pub logger_name: &'static str,
    pub was_forced: bool,
    pub skipped_log_count: Option<usize>,
}

impl RecordingBackend {
    pub fn new(name: &'static str) -> Self {
        Self { name, records: parking_lot::Mutex::new(Vec::new()) }
    }

    pub fn entries(&self) -> Vec<RecordedEntry> {
        std::mem::take(&mut self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl LoggerBackend for RecordingBackend {
    fn logger_name(&self) -> &str {
        self.name
    }

    fn is_loggable(&self, _level: Level) -> bool {
        true
    }

    fn log(&self, data: &LogData) -> Result<(), BackendError> {
        let skipped_log_count = data.metadata.find_value(&crate::metadata::SKIPPED_LOG_COUNT).copied();
        self.records.lock().push(RecordedEntry::Logged(LogDataSnapshot {
            level: data.level,
            logger_name: self.name,
            was_forced: data.was_forced,
            skipped_log_count,
        }));
        Ok(())
    }

    fn handle_error(&self, error: &(dyn std::error::Error + Send + Sync), _bad_data: &LogData) -> Result<(), BackendError> {
        self.records.lock().push(RecordedEntry::Errored(error.to_string()));
        Ok(())
    }
}
