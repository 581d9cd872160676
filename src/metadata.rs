//! Typed metadata keys and the ordered key→value sequence attached to every
//! [`crate::context::LogContext`] and carried through to [`crate::backend`].

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::log_site::Qualifier;
use crate::scope::LoggingScope;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`MetadataKey`]. Two keys with the same label are still
/// distinct keys: comparison is by this id, never by label.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct KeyId(u64);

/// How a backend should render a metadata value: a single string, or (for a
/// repeated key with more than one value) several.
#[derive(Clone, Debug)]
pub enum EmittedValue {
    Single(String),
    Multi(Vec<String>),
}

/// A typed, labeled metadata key. `label` is informational only; `repeatable`
/// controls whether adding a value again replaces the prior one (false) or
/// appends (true, preserving insertion order).
pub struct MetadataKey<T: 'static> {
    id: KeyId,
    label: &'static str,
    repeatable: bool,
    emit_fn: fn(&T) -> EmittedValue,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: 'static> MetadataKey<T> {
    pub fn single(label: &'static str, emit_fn: fn(&T) -> EmittedValue) -> Self {
        Self { id: KeyId(NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed)), label, repeatable: false, emit_fn, _marker: std::marker::PhantomData }
    }

    pub fn repeated(label: &'static str, emit_fn: fn(&T) -> EmittedValue) -> Self {
        Self { id: KeyId(NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed)), label, repeatable: true, emit_fn, _marker: std::marker::PhantomData }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    pub fn id(&self) -> KeyId {
        self.id
    }
}

/// Type-erased face of [`MetadataKey`], so entries of differing `T` can sit
/// side by side in one [`MutableMetadata`].
pub trait ErasedMetadataKey: Send + Sync {
    fn label(&self) -> &'static str;
    fn is_repeatable(&self) -> bool;
    fn key_id(&self) -> KeyId;
    fn emit(&self, value: &dyn Any) -> EmittedValue;
}

impl<T: Send + Sync + 'static> ErasedMetadataKey for MetadataKey<T> {
    fn label(&self) -> &'static str {
        self.label
    }

    fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    fn key_id(&self) -> KeyId {
        self.id
    }

    fn emit(&self, value: &dyn Any) -> EmittedValue {
        (self.emit_fn)(value.downcast_ref::<T>().expect("metadata value type mismatch for key"))
    }
}

struct Entry {
    key: &'static dyn ErasedMetadataKey,
    value: Box<dyn Any + Send + Sync>,
}

/// A read-only ordered view over a sequence of `(key, value)` entries.
/// Callers must not cache one across context mutation: the backing storage
/// may grow and reallocate.
pub struct Metadata<'a> {
    entries: &'a [Entry],
}

impl<'a> Metadata<'a> {
    pub fn empty() -> Metadata<'static> {
        Metadata { entries: &[] }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn get_key(&self, index: usize) -> &'static dyn ErasedMetadataKey {
        self.entries[index].key
    }

    pub fn get_value_any(&self, index: usize) -> &dyn Any {
        self.entries[index].value.as_ref()
    }

    /// First value for a non-repeatable (or repeatable) key: first
    /// insertion wins.
    pub fn find_value<T: 'static>(&self, key: &MetadataKey<T>) -> Option<&T> {
        self.entries
            .iter()
            .find(|e| e.key.key_id() == key.id())
            .and_then(|e| e.value.downcast_ref::<T>())
    }

    /// All values for a repeatable key, in insertion order.
    pub fn find_all<T: Clone + 'static>(&self, key: &MetadataKey<T>) -> Vec<T> {
        self.entries
            .iter()
            .filter(|e| e.key.key_id() == key.id())
            .filter_map(|e| e.value.downcast_ref::<T>())
            .cloned()
            .collect()
    }
}

/// The per-context mutable metadata store. Stored as a flat, growable
/// sequence of entries; `Vec`'s own amortized-doubling growth already gives
/// the "reserve 4, double on growth" behavior without manual bookkeeping.
pub struct MutableMetadata {
    entries: Vec<Entry>,
}

impl MutableMetadata {
    pub fn new() -> Self {
        Self { entries: Vec::with_capacity(4) }
    }

    pub fn view(&self) -> Metadata<'_> {
        Metadata { entries: &self.entries }
    }

    /// Adds `value` under `key`. For a non-repeatable key, replaces any
    /// existing value **in place** (same position); for a repeatable key,
    /// appends, preserving insertion order.
    pub fn add<T: Send + Sync + 'static>(&mut self, key: &'static MetadataKey<T>, value: T) {
        if !key.is_repeatable() {
            if let Some(existing) = self.entries.iter_mut().find(|e| e.key.key_id() == key.id()) {
                existing.value = Box::new(value);
                return;
            }
        }
        self.entries.push(Entry { key, value: Box::new(value) });
    }

    /// Removes every entry for `key`, compacting the remaining entries.
    pub fn remove_all(&mut self, key: &'static dyn ErasedMetadataKey) {
        self.entries.retain(|e| e.key.key_id() != key.key_id());
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn find_value<T: 'static>(&self, key: &MetadataKey<T>) -> Option<&T> {
        self.view().find_value(key)
    }

    pub fn find_all<T: Clone + 'static>(&self, key: &MetadataKey<T>) -> Vec<T> {
        self.view().find_all(key)
    }
}

impl Default for MutableMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// The value carried by a repeated `LOG_SITE_GROUPING_KEY` entry: either a
/// plain qualifier value (`per(key, value)`) or a scope whose `specialize()`
/// must be used instead of a raw wrap (`per(scope_provider)`).
#[derive(Clone)]
pub enum GroupingKey {
    Scope(LoggingScope),
    Value(Arc<dyn Qualifier>),
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupingKey::Scope(s) => write!(f, "{s}"),
            GroupingKey::Value(v) => write!(f, "{v}"),
        }
    }
}

/// How much of the stack `withStackTrace` should capture.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StackSize {
    Small,
    Medium,
    Large,
    Full,
}

impl StackSize {
    /// `None` for `Full`, meaning "unbounded".
    pub fn max_depth(self) -> Option<usize> {
        match self {
            StackSize::Small => Some(10),
            StackSize::Medium => Some(20),
            StackSize::Large => Some(50),
            StackSize::Full => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StackSize::Small => "SMALL",
            StackSize::Medium => "MEDIUM",
            StackSize::Large => "LARGE",
            StackSize::Full => "FULL",
        }
    }
}

/// An error cause attached with `withCause`.
pub type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// Injected tags from the platform (`Platform::injected_tags`), merged with
/// any log-site `TAGS` metadata before dispatch.
#[derive(Clone, Default, Debug)]
pub struct Tags(pub Vec<(&'static str, String)>);

impl Tags {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn merge(&mut self, other: &Tags) {
        self.0.extend(other.0.iter().cloned());
    }
}

fn emit_display<T: fmt::Display>(v: &T) -> EmittedValue {
    EmittedValue::Single(v.to_string())
}

lazy_static::lazy_static! {
    pub static ref LOG_CAUSE: MetadataKey<Cause> =
        MetadataKey::single("cause", |v: &Cause| EmittedValue::Single(v.to_string()));

    pub static ref LOG_EVERY_N: MetadataKey<u32> =
        MetadataKey::single("ratelimit.count", |v: &u32| emit_display(v));

    pub static ref LOG_SAMPLE_EVERY_N: MetadataKey<u32> =
        MetadataKey::single("ratelimit.sampled", |v: &u32| emit_display(v));

    pub static ref LOG_AT_MOST_EVERY: MetadataKey<crate::rate_limit::RateLimitPeriod> =
        MetadataKey::single("ratelimit.period", |v: &crate::rate_limit::RateLimitPeriod| emit_display(v));

    pub static ref LOG_SITE_GROUPING_KEY: MetadataKey<GroupingKey> =
        MetadataKey::repeated("group_by", |v: &GroupingKey| emit_display(v));

    pub static ref CONTEXT_STACK_SIZE: MetadataKey<StackSize> =
        MetadataKey::single("stacktrace", |v: &StackSize| EmittedValue::Single(v.name().to_string()));

    pub static ref WAS_FORCED: MetadataKey<bool> =
        MetadataKey::single("forced", |v: &bool| emit_display(v));

    pub static ref SKIPPED_LOG_COUNT: MetadataKey<usize> =
        MetadataKey::single("ratelimit.skipped", |v: &usize| emit_display(v));

    pub static ref TAGS: MetadataKey<Tags> =
        MetadataKey::single("tags", |v: &Tags| {
            EmittedValue::Multi(v.0.iter().map(|(k, val)| format!("{k}={val}")).collect())
        });
}

/// The grouping emission rule: a single qualifier emits as
/// `(label="group_by", value=q)`; more than one emits as `value="[q1,q2,...]"`.
pub fn grouping_emission(metadata: &Metadata) -> Option<(&'static str, String)> {
    let values = metadata.find_all(&LOG_SITE_GROUPING_KEY);
    match values.len() {
        0 => None,
        1 => Some((LOG_SITE_GROUPING_KEY.label(), values[0].to_string())),
        _ => {
            let joined = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
            Some((LOG_SITE_GROUPING_KEY.label(), format!("[{joined}]")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak<T: 'static>(key: MetadataKey<T>) -> &'static MetadataKey<T> {
        Box::leak(Box::new(key))
    }

    #[test]
    fn non_repeatable_replace_preserves_position() {
        let a = leak(MetadataKey::single("a", |v| emit_display(v)));
        let b = leak(MetadataKey::single("b", |v: &u32| emit_display(v)));
        let mut md = MutableMetadata::new();
        md.add(a, 1u32);
        md.add(b, 2);
        md.add(a, 99);
        assert_eq!(md.size(), 2);
        assert_eq!(md.view().find_value(a), Some(&99));
        assert_eq!(md.view().get_value_any(0).downcast_ref::<u32>(), Some(&99));
    }

    #[test]
    fn repeatable_preserves_insertion_order() {
        let rep = leak(MetadataKey::repeated("r", |v: &u32| emit_display(v)));
        let mut md = MutableMetadata::new();
        md.add(rep, 1);
        md.add(rep, 2);
        md.add(rep, 3);
        assert_eq!(md.find_all(rep), vec![1, 2, 3]);
        assert_eq!(md.find_value(rep), Some(&1));
    }

    #[test]
    fn remove_all_compacts() {
        let a = leak(MetadataKey::single("a", |v: &u32| emit_display(v)));
        let b = leak(MetadataKey::single("b", |v: &u32| emit_display(v)));
        let mut md = MutableMetadata::new();
        md.add(a, 1);
        md.add(b, 2);
        md.remove_all(a);
        assert_eq!(md.size(), 1);
        assert_eq!(md.find_value(b), Some(&2));
    }

    #[test]
    fn grouping_emission_single_vs_multi() {
        let mut md = MutableMetadata::new();
        md.add(&LOG_SITE_GROUPING_KEY, GroupingKey::Value(Arc::new("A".to_string())));
        assert_eq!(grouping_emission(&md.view()), Some(("group_by", "A".to_string())));
        md.add(&LOG_SITE_GROUPING_KEY, GroupingKey::Value(Arc::new("B".to_string())));
        assert_eq!(grouping_emission(&md.view()), Some(("group_by", "[A,B]".to_string())));
    }
}
