//! Log-site identity: the `(class, method, line, file)` value that names a
//! log statement, and the specialization machinery that lets metadata turn
//! one log site into several distinct map keys.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_INJECTED_ID: AtomicU64 = AtomicU64::new(1);

/// `1..=65535`, or `0` for unknown.
pub const UNKNOWN_LINE: u32 = 0;

/// Immutable identity of a single log statement.
///
/// Equality for ordinary (stack-derived) sites compares all four fields.
/// [`LogSite::new_injected`] instances compare by identity only, so that two
/// injections carrying the same textual coordinates remain distinct keys.
#[derive(Clone, Debug)]
pub struct LogSite {
    class_name: &'static str,
    method_name: &'static str,
    line_number: u32,
    file_name: Option<&'static str>,
    injected_id: Option<u64>,
}

impl LogSite {
    /// Sentinel used to explicitly suppress log-site analysis. Distinct from
    /// "not yet resolved": callers that see `INVALID` know analysis was
    /// deliberately skipped, not merely pending.
    pub const INVALID: LogSite = LogSite {
        class_name: "<invalid>",
        method_name: "<invalid>",
        line_number: UNKNOWN_LINE,
        file_name: None,
        injected_id: None,
    };

    pub fn new(
        class_name: &'static str,
        method_name: &'static str,
        line_number: u32,
        file_name: Option<&'static str>,
    ) -> Self {
        Self { class_name, method_name, line_number, file_name, injected_id: None }
    }

    /// Build a log site that always compares as its own distinct identity,
    /// regardless of any other instance sharing the same textual fields.
    pub fn new_injected(
        class_name: &'static str,
        method_name: &'static str,
        line_number: u32,
        file_name: Option<&'static str>,
    ) -> Self {
        let id = NEXT_INJECTED_ID.fetch_add(1, Ordering::Relaxed);
        Self { class_name, method_name, line_number, file_name, injected_id: Some(id) }
    }

    pub fn is_invalid(&self) -> bool {
        self.injected_id.is_none()
            && self.class_name == Self::INVALID.class_name
            && self.method_name == Self::INVALID.method_name
            && self.line_number == Self::INVALID.line_number
    }

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn method_name(&self) -> &'static str {
        self.method_name
    }

    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    pub fn file_name(&self) -> Option<&'static str> {
        self.file_name
    }
}

impl PartialEq for LogSite {
    fn eq(&self, other: &Self) -> bool {
        match (self.injected_id, other.injected_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => {
                self.class_name == other.class_name
                    && self.method_name == other.method_name
                    && self.line_number == other.line_number
                    && self.file_name == other.file_name
            }
            _ => false,
        }
    }
}

impl Eq for LogSite {}

impl Hash for LogSite {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.injected_id {
            Some(id) => {
                state.write_u8(1);
                id.hash(state);
            }
            None => {
                state.write_u8(0);
                self.class_name.hash(state);
                self.method_name.hash(state);
                self.line_number.hash(state);
                self.file_name.hash(state);
            }
        }
    }
}

impl fmt::Display for LogSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method_name)?;
        if let Some(file) = self.file_name {
            write!(f, "({}:{})", file, self.line_number)?;
        }
        Ok(())
    }
}

/// A value usable as a log-site specialization qualifier: per-call-site
/// grouping values (`per(key, value)`) and [`crate::scope::LoggingScope`]
/// key-parts both implement it.
///
/// The blanket impl covers any `Display + Eq + Hash` value; scopes provide a
/// manual impl based on reference identity instead of structural equality.
pub trait Qualifier: fmt::Display + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn qualifier_eq(&self, other: &dyn Qualifier) -> bool;
    fn qualifier_hash(&self, state: &mut dyn Hasher);
}

impl<T> Qualifier for T
where
    T: fmt::Display + Eq + Hash + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn qualifier_eq(&self, other: &dyn Qualifier) -> bool {
        match other.as_any().downcast_ref::<T>() {
            Some(o) => self == o,
            None => false,
        }
    }

    fn qualifier_hash(&self, state: &mut dyn Hasher) {
        self.hash(state)
    }
}

/// Opaque identity usable as a [`crate::log_site_map::LogSiteMap`] key. Every
/// [`LogSite`] is one; [`SpecializedLogSiteKey`] wraps one with a qualifier.
pub trait LogSiteKey: Send + Sync {
    fn key_eq(&self, other: &dyn LogSiteKey) -> bool;
    fn key_hash(&self, state: &mut dyn Hasher);
    fn as_any(&self) -> &dyn Any;
}

impl LogSiteKey for LogSite {
    fn key_eq(&self, other: &dyn LogSiteKey) -> bool {
        match other.as_any().downcast_ref::<LogSite>() {
            Some(o) => self == o,
            None => false,
        }
    }

    fn key_hash(&self, state: &mut dyn Hasher) {
        self.hash(state)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A [`LogSiteKey`] wrapping a base key with a qualifier. Distinct from the
/// base key, and distinct from any other wrapping order or count: specializing
/// twice with the same qualifier is not idempotent, and
/// `specialize(specialize(K,a),b) != specialize(specialize(K,b),a)`.
#[derive(Clone)]
pub struct SpecializedLogSiteKey {
    base: Arc<dyn LogSiteKey>,
    qualifier: Arc<dyn Qualifier>,
}

impl SpecializedLogSiteKey {
    pub fn of(base: Arc<dyn LogSiteKey>, qualifier: Arc<dyn Qualifier>) -> Self {
        Self { base, qualifier }
    }

    pub fn qualifier(&self) -> &Arc<dyn Qualifier> {
        &self.qualifier
    }

    pub fn base(&self) -> &Arc<dyn LogSiteKey> {
        &self.base
    }
}

impl LogSiteKey for SpecializedLogSiteKey {
    fn key_eq(&self, other: &dyn LogSiteKey) -> bool {
        match other.as_any().downcast_ref::<SpecializedLogSiteKey>() {
            Some(o) => self.base.key_eq(o.base.as_ref()) && self.qualifier.qualifier_eq(o.qualifier.as_ref()),
            None => false,
        }
    }

    fn key_hash(&self, state: &mut dyn Hasher) {
        // Hasher::write is order-sensitive, so wrapping order changes the
        // resulting hash.
        self.base.key_hash(state);
        self.qualifier.qualifier_hash(state);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `Eq + Hash` wrapper around `Arc<dyn LogSiteKey>`, so it can be used as a
/// map key directly.
#[derive(Clone)]
pub struct SiteKeyHandle(pub Arc<dyn LogSiteKey>);

impl SiteKeyHandle {
    pub fn new(key: Arc<dyn LogSiteKey>) -> Self {
        Self(key)
    }
}

impl PartialEq for SiteKeyHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.key_eq(other.0.as_ref())
    }
}

impl Eq for SiteKeyHandle {}

impl Hash for SiteKeyHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key_hash(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Arc<dyn LogSiteKey> {
        Arc::new(LogSite::new("pkg::Widget", "spin", 42, Some("widget.rs")))
    }

    #[test]
    fn specialize_differs_from_base() {
        let base = site();
        let spec = SpecializedLogSiteKey::of(base.clone(), Arc::new("a".to_string()));
        assert!(!base.key_eq(&spec));
        assert!(!spec.key_eq(base.as_ref()));
    }

    #[test]
    fn repeated_specialization_is_not_idempotent() {
        let base = site();
        let once = SpecializedLogSiteKey::of(base.clone(), Arc::new("a".to_string()));
        let twice = SpecializedLogSiteKey::of(Arc::new(once.clone()), Arc::new("a".to_string()));
        assert!(!once.key_eq(&twice));
    }

    #[test]
    fn specialization_order_is_significant() {
        let base = site();
        let a_then_b = SpecializedLogSiteKey::of(
            Arc::new(SpecializedLogSiteKey::of(base.clone(), Arc::new("a".to_string()))),
            Arc::new("b".to_string()),
        );
        let b_then_a = SpecializedLogSiteKey::of(
            Arc::new(SpecializedLogSiteKey::of(base.clone(), Arc::new("b".to_string()))),
            Arc::new("a".to_string()),
        );
        assert!(!a_then_b.key_eq(&b_then_a));
    }

    #[test]
    fn handle_equality_matches_key_eq() {
        let base = site();
        let h1 = SiteKeyHandle::new(base.clone());
        let h2 = SiteKeyHandle::new(site());
        assert_eq!(h1, h2);

        let h3 = SiteKeyHandle::new(Arc::new(SpecializedLogSiteKey::of(base, Arc::new(7i64))));
        assert_ne!(h1, h3);
    }

    #[test]
    fn invalid_site_is_recognized() {
        assert!(LogSite::INVALID.is_invalid());
        assert!(!site().as_any().downcast_ref::<LogSite>().unwrap().is_invalid());
    }

    #[test]
    fn injected_sites_are_unique_even_with_same_fields() {
        let a = LogSite::new_injected("C", "m", 1, None);
        let b = LogSite::new_injected("C", "m", 1, None);
        assert_ne!(a, b);
    }
}
