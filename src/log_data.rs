//! The object a [`crate::context::LogContext`] hands to the backend: message
//! representation, argument wrappers, and the assembled `LogData` record.

use std::borrow::Cow;
use std::fmt;

use log::Level;

use crate::log_site::LogSite;
use crate::metadata::MutableMetadata;

/// Replaces the source's literal-vs-template sentinel (an interned empty
/// string used as an identity marker) with a tagged variant: `log("raw text")`
/// is `Literal`, `log("fmt {}", arg)` is `Template`. Either way `raw %`
/// characters in a `Literal` are never interpreted.
pub enum Message {
    Literal(Cow<'static, str>),
    Template { template: &'static str, args: Vec<Arg> },
}

impl Message {
    /// The `log(null, null)` edge case's fixed sentinel text.
    pub const NULL_SENTINEL: &'static str = "<null>";
}

/// One positional template argument. `Lazy` thunks run exactly once, on the
/// calling thread, during post-processing (never inside the backend).
pub enum Arg {
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Str(Cow<'static, str>),
    Lazy(Box<dyn FnOnce() -> String + Send>),
    Null,
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::I64(v) => write!(f, "I64({v})"),
            Arg::U64(v) => write!(f, "U64({v})"),
            Arg::F64(v) => write!(f, "F64({v})"),
            Arg::Bool(v) => write!(f, "Bool({v})"),
            Arg::Str(v) => write!(f, "Str({v:?})"),
            Arg::Lazy(_) => write!(f, "Lazy(..)"),
            Arg::Null => write!(f, "Null"),
        }
    }
}

impl Arg {
    /// Evaluates a lazy thunk to its rendered string, passing everything else
    /// through unchanged. Consumes `self` since `Lazy` thunks are `FnOnce`.
    pub fn evaluate(self) -> EvaluatedArg {
        match self {
            Arg::I64(v) => EvaluatedArg::I64(v),
            Arg::U64(v) => EvaluatedArg::U64(v),
            Arg::F64(v) => EvaluatedArg::F64(v),
            Arg::Bool(v) => EvaluatedArg::Bool(v),
            Arg::Str(v) => EvaluatedArg::Str(v),
            Arg::Lazy(thunk) => EvaluatedArg::Str(Cow::Owned(thunk())),
            Arg::Null => EvaluatedArg::Null,
        }
    }
}

/// The post-evaluation form of [`Arg`]: no more thunks left to run.
#[derive(Debug, Clone)]
pub enum EvaluatedArg {
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Str(Cow<'static, str>),
    Null,
}

impl fmt::Display for EvaluatedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluatedArg::I64(v) => write!(f, "{v}"),
            EvaluatedArg::U64(v) => write!(f, "{v}"),
            EvaluatedArg::F64(v) => write!(f, "{v}"),
            EvaluatedArg::Bool(v) => write!(f, "{v}"),
            EvaluatedArg::Str(v) => write!(f, "{v}"),
            EvaluatedArg::Null => write!(f, "null"),
        }
    }
}

/// The fully post-processed form of [`Message`], handed to the backend:
/// lazy arguments are already evaluated.
pub enum RenderedMessage {
    Literal(Cow<'static, str>),
    Template { template: &'static str, args: Vec<EvaluatedArg> },
}

/// The record a [`crate::backend::LoggerBackend`] receives: everything a
/// log call produced, after post-processing decided to emit.
pub struct LogData {
    pub level: Level,
    pub timestamp_nanos: i64,
    pub logger_name: &'static str,
    pub log_site: LogSite,
    pub metadata: MutableMetadata,
    pub message: RenderedMessage,
    pub was_forced: bool,
}
