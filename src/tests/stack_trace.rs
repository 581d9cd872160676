//! `withStackTrace` replaces (or chains onto) any prior cause, and the
//! `CONTEXT_STACK_SIZE` key itself never reaches the backend: it is consumed
//! during post-processing and replaced with a `LOG_CAUSE` entry instead.

use std::sync::{Arc, Mutex};

use log::Level;

use crate::error::BackendError;
use crate::log_data::LogData;
use crate::logger::Logger;
use crate::metadata::{StackSize, CONTEXT_STACK_SIZE, LOG_CAUSE};
use crate::platform::SystemPlatform;

#[derive(Default)]
struct Capture {
    saw_cause: Mutex<bool>,
    saw_stack_size_key: Mutex<bool>,
}

impl crate::backend::LoggerBackend for Capture {
    fn logger_name(&self) -> &str {
        "capture"
    }

    fn is_loggable(&self, _level: Level) -> bool {
        true
    }

    fn log(&self, data: &LogData) -> Result<(), BackendError> {
        if data.metadata.find_value(&CONTEXT_STACK_SIZE).is_some() {
            *self.saw_stack_size_key.lock().unwrap() = true;
        }
        if data.metadata.find_value(&LOG_CAUSE).is_some() {
            *self.saw_cause.lock().unwrap() = true;
        }
        Ok(())
    }

    fn handle_error(&self, _error: &(dyn std::error::Error + Send + Sync), _bad_data: &LogData) -> Result<(), BackendError> {
        Ok(())
    }
}

#[test]
fn stack_size_key_never_reaches_backend_but_a_cause_does() {
    let capture = Arc::new(Capture::default());
    let logger = Logger::with_platform("stack", capture.clone(), Arc::new(SystemPlatform));
    logger.at(Level::Warn).with_stack_trace(Some(StackSize::Small)).log("boom");
    assert!(!*capture.saw_stack_size_key.lock().unwrap());
    assert!(*capture.saw_cause.lock().unwrap());
}
