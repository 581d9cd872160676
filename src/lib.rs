#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # fluent-log
//!
//! A fluent, Flogger-style logging front-end built on top of the crate `log`.
//!
//! ``` rust
//! use std::sync::Arc;
//! use fluent_log::{Logger, RecordingBackend};
//! use log::Level;
//!
//! let backend = Arc::new(RecordingBackend::new("demo"));
//! let logger = Logger::new("demo", backend.clone());
//! logger.at(Level::Info).log("engage");
//! logger.at(Level::Warn).every(2).log_fmt("retry {}", vec![fluent_log::Arg::I64(3)]);
//! ```
//!
//! ## Overview
//!
//! * [Logger]/[LoggingApi]/[LogContext]: the fluent call chain, e.g.
//!   `logger.at(level).with_cause(..).every(n).log(..)`.
//!
//! * Per-log-site rate limiting: [every](LoggingApi::every),
//!   [on_average_every](LoggingApi::on_average_every) and
//!   [at_most_every](LoggingApi::at_most_every), composed through
//!   [rate_limit::RateLimitStatus].
//!
//! * [LogSite]/[log_site::LogSiteKey]/[log_site::SpecializedLogSiteKey]: log
//!   statement identity and the `per(..)` specialization machinery.
//!
//! * [LoggingScope]/[ScopeProvider]: an explicit-close lifetime qualifier that
//!   removes per-log-site state once a request (or other logical unit of
//!   work) ends.
//!
//! * [LogLevelMap]: a hierarchical dotted-name trie of minimum enabled
//!   levels, installed process-wide with [platform::set_log_level_map].
//!
//! * [Platform]/[SystemPlatform]: the seam a host process overrides to
//!   control the clock, caller resolution, injected tags and force-logging
//!   policy.
//!
//! * [LoggerBackend]/[RecordingBackend]: the pluggable sink contract. This
//!   crate ships no real sink, only the in-tree test double.
//!
//! ## Fine-grain level control
//!
//! ``` rust
//! use fluent_log::{LogLevelMap, platform};
//! use log::Level;
//!
//! let map = LogLevelMap::builder(Level::Info)
//!     .add("app.db", Level::Debug).unwrap()
//!     .add_off("app.db.pool").unwrap()
//!     .build();
//! platform::set_log_level_map(map);
//! ```
//!
//! ## Rate limiting
//!
//! ``` rust
//! use std::sync::Arc;
//! use fluent_log::{Logger, RecordingBackend};
//! use log::Level;
//!
//! let backend = Arc::new(RecordingBackend::new("svc"));
//! let logger = Logger::new("svc", backend);
//! for _ in 0..10 {
//!     logger.at(Level::Warn).every(3).log("heartbeat missed");
//! }
//! ```

mod backend;
mod context;
mod error;
mod log_data;
mod log_level_map;
mod log_site;
mod log_site_map;
mod logger;
mod metadata;
pub mod platform;
mod rate_limit;
mod scope;

pub use crate::backend::{LogDataSnapshot, LoggerBackend, RecordedEntry, RecordingBackend};
pub use crate::context::{LogContext, LoggingApi};
pub use crate::error::{BackendError, LogContextError, LoggingException};
pub use crate::log_data::{Arg, EvaluatedArg, LogData, Message, RenderedMessage};
pub use crate::log_level_map::{LogLevelMap, LogLevelMapBuilder};
pub use crate::log_site::{LogSite, LogSiteKey, Qualifier, SiteKeyHandle, SpecializedLogSiteKey};
pub use crate::log_site_map::{LockFreeState, LogSiteMap};
pub use crate::logger::Logger;
pub use crate::metadata::{
    Cause, EmittedValue, ErasedMetadataKey, GroupingKey, KeyId, Metadata, MetadataKey, MutableMetadata, StackSize,
    Tags, CONTEXT_STACK_SIZE, LOG_AT_MOST_EVERY, LOG_CAUSE, LOG_EVERY_N, LOG_SAMPLE_EVERY_N, LOG_SITE_GROUPING_KEY,
    SKIPPED_LOG_COUNT, TAGS, WAS_FORCED,
};
pub use crate::platform::{Platform, SystemPlatform};
pub use crate::rate_limit::{RateLimitPeriod, RateLimitStatus, RateLimiters, StatefulStatus, TimeUnit};
pub use crate::scope::{LoggingScope, ScopeProvider};

pub use log::{Level, LevelFilter};

#[cfg(test)]
mod tests;
