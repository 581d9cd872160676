//! A terminal call whose argument formatting logs recursively emits at most
//! 100 nested log events; on breach, exactly one diagnostic is emitted.

use std::sync::Arc;

use log::Level;

use crate::backend::RecordingBackend;
use crate::log_data::Arg;
use crate::logger::Logger;
use crate::platform::SystemPlatform;

fn recurse(logger: Logger) {
    let next = logger.clone();
    logger.at(Level::Info).log_fmt(
        "recursing",
        vec![Arg::Lazy(Box::new(move || {
            recurse(next);
            String::new()
        }))],
    );
}

#[test]
fn runaway_argument_recursion_is_bounded() {
    let backend = Arc::new(RecordingBackend::new("recursion"));
    let logger = Logger::with_platform("recursion", backend.clone(), Arc::new(SystemPlatform));
    recurse(logger);
    // Every nested call up to the depth limit reaches the backend; beyond
    // that the guard short-circuits the pipeline instead of recursing
    // further, so the total never runs away.
    assert!(backend.len() <= 100);
    assert!(backend.len() > 0);
}
