//! Lifetime-bound qualifiers ([`LoggingScope`]) that can remove per-log-site
//! state from every [`crate::log_site_map::LogSiteMap`] that holds a key
//! specialized with them, once the scope ends.
//!
//! Rust has no garbage-collector-observed unreachability to fire removal
//! hooks automatically, so this crate requires an explicit
//! [`LoggingScope::close`] call instead.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// The qualifier half of a scope: the object every specialized key actually
/// references. Kept separate from [`LoggingScope`] so the scope's close-hook
/// queue has one clear owner and scopes are cheap to clone (an `Arc` bump).
pub(crate) struct KeyPart {
    id: u64,
    label: &'static str,
    closed: AtomicBool,
    hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl KeyPart {
    fn new(label: &'static str) -> Self {
        Self { id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed), label, closed: AtomicBool::new(false), hooks: Mutex::new(Vec::new()) }
    }

    fn on_close(&self, hook: Box<dyn FnOnce() + Send>) {
        if self.closed.load(Ordering::Acquire) {
            hook();
            return;
        }
        let mut hooks = self.hooks.lock();
        if self.closed.load(Ordering::Acquire) {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(hook);
    }

    /// Runs and clears every registered hook. Safe to call more than once;
    /// only the first call has any effect. Each hook runs at most once.
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for KeyPart {}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// A labeled, lifetime-bound qualifier. Specializing a log-site key with a
/// scope (directly, or via [`crate::metadata::LOG_SITE_GROUPING_KEY`]) makes
/// that key removable: once the scope [`close`](LoggingScope::close)s, every
/// `LogSiteMap` entry keyed with one of its specializations is dropped.
#[derive(Clone)]
pub struct LoggingScope {
    key_part: Arc<KeyPart>,
}

impl LoggingScope {
    pub fn new(label: &'static str) -> Self {
        Self { key_part: Arc::new(KeyPart::new(label)) }
    }

    pub fn label(&self) -> &'static str {
        self.key_part.label
    }

    /// The qualifier used by [`crate::log_site::SpecializedLogSiteKey`].
    /// Two `LoggingScope` clones (from the same `new()` call) share one
    /// `KeyPart`, so they specialize to the same key.
    pub(crate) fn key_part(&self) -> Arc<KeyPart> {
        self.key_part.clone()
    }

    /// Wrap `base` with this scope's qualifier.
    pub fn specialize(&self, base: Arc<dyn crate::log_site::LogSiteKey>) -> crate::log_site::SpecializedLogSiteKey {
        crate::log_site::SpecializedLogSiteKey::of(base, self.key_part.clone())
    }

    /// Register a hook that fires exactly once, when the scope closes (or
    /// immediately, if it already has). No ordering is promised across hooks
    /// registered on the same scope.
    pub fn on_close(&self, hook: impl FnOnce() + Send + 'static) {
        self.key_part.on_close(Box::new(hook));
    }

    /// Ends the scope: runs every registered close hook exactly once.
    /// Idempotent: closing an already-closed scope is a no-op.
    pub fn close(&self) {
        self.key_part.close();
    }

    pub fn is_closed(&self) -> bool {
        self.key_part.closed.load(Ordering::Acquire)
    }
}

impl fmt::Display for LoggingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_part)
    }
}

/// Supplies a [`LoggingScope`] to `per(scope_provider)`, e.g. a thread-local
/// "current request" scope a service installs per inbound call.
pub trait ScopeProvider: Send + Sync {
    fn get_scope(&self) -> LoggingScope;
}
