//! A hierarchical dotted-name trie from logger-name prefixes to minimum
//! enabled levels: a whole tree of categories sharing one default, rather
//! than a single flat category.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::Level;

use crate::error::LogContextError;

fn level_to_usize(level: Level) -> usize {
    level as usize
}

fn usize_to_level(v: usize) -> Option<Level> {
    match v {
        1 => Some(Level::Error),
        2 => Some(Level::Warn),
        3 => Some(Level::Info),
        4 => Some(Level::Debug),
        5 => Some(Level::Trace),
        _ => None,
    }
}

/// `OFF` sentinel: no `log::Level` variant reaches this low, so it is
/// reserved as the "always disabled" value for the map's `AtomicUsize` cells.
const OFF: usize = 0;

fn validate_name(name: &str) -> Result<(), LogContextError> {
    if name.is_empty() || name.starts_with('.') || name.ends_with('.') || name.contains("..") {
        return Err(LogContextError::IllegalArgument(format!("invalid logger-name prefix: {name:?}")));
    }
    Ok(())
}

/// A single insertion: `name` enabled down to `level`, or `OFF` entirely.
struct Rule {
    name: String,
    level: usize,
}

/// Builder for a [`LogLevelMap`]. Consumes itself on `build()`: reject bad
/// input before construction rather than leaving an invalid map reachable.
#[derive(Default)]
pub struct LogLevelMapBuilder {
    default_level: usize,
    rules: Vec<Rule>,
    seen: std::collections::HashSet<String>,
}

impl LogLevelMapBuilder {
    pub fn new(default_level: Level) -> Self {
        Self { default_level: level_to_usize(default_level), rules: Vec::new(), seen: Default::default() }
    }

    pub fn add(mut self, name: &str, level: Level) -> Result<Self, LogContextError> {
        validate_name(name)?;
        if !self.seen.insert(name.to_string()) {
            return Err(LogContextError::IllegalArgument(format!("duplicate logger-name prefix: {name:?}")));
        }
        self.rules.push(Rule { name: name.to_string(), level: level_to_usize(level) });
        Ok(self)
    }

    pub fn add_off(mut self, name: &str) -> Result<Self, LogContextError> {
        validate_name(name)?;
        if !self.seen.insert(name.to_string()) {
            return Err(LogContextError::IllegalArgument(format!("duplicate logger-name prefix: {name:?}")));
        }
        self.rules.push(Rule { name: name.to_string(), level: OFF });
        Ok(self)
    }

    pub fn build(self) -> LogLevelMap {
        let mut by_name = HashMap::new();
        for rule in self.rules {
            by_name.insert(rule.name, AtomicUsize::new(rule.level));
        }
        LogLevelMap { default_level: AtomicUsize::new(self.default_level), by_name }
    }
}

/// `getLevel(name)` returns the longest dotted-prefix match, or the default.
/// `OFF` (not a real `Level`) is represented as `None`.
pub struct LogLevelMap {
    default_level: AtomicUsize,
    by_name: HashMap<String, AtomicUsize>,
}

impl LogLevelMap {
    pub fn builder(default_level: Level) -> LogLevelMapBuilder {
        LogLevelMapBuilder::new(default_level)
    }

    /// `None` means `OFF`: no level is enabled for this name.
    pub fn get_level(&self, name: &str) -> Option<Level> {
        let mut best: Option<&AtomicUsize> = None;
        let mut best_len = 0usize;
        for (prefix, cell) in &self.by_name {
            if (name == prefix.as_str() || name.starts_with(&format!("{prefix}."))) && prefix.len() >= best_len {
                best = Some(cell);
                best_len = prefix.len();
            }
        }
        let raw = best.map(|c| c.load(Ordering::Relaxed)).unwrap_or_else(|| self.default_level.load(Ordering::Relaxed));
        usize_to_level(raw)
    }

    /// Takes the *finer* (more permissive, numerically larger) level for every
    /// key in the union of `self` and `other`; the default becomes the finer
    /// of the two defaults.
    pub fn merge(&self, other: &LogLevelMap) -> LogLevelMap {
        let mut by_name = HashMap::new();
        for (name, cell) in &self.by_name {
            by_name.insert(name.clone(), AtomicUsize::new(cell.load(Ordering::Relaxed)));
        }
        for (name, cell) in &other.by_name {
            let other_level = cell.load(Ordering::Relaxed);
            by_name
                .entry(name.clone())
                .and_modify(|existing: &mut AtomicUsize| {
                    let cur = existing.load(Ordering::Relaxed);
                    if other_level > cur {
                        existing.store(other_level, Ordering::Relaxed);
                    }
                })
                .or_insert_with(|| AtomicUsize::new(other_level));
        }
        let default_level = self.default_level.load(Ordering::Relaxed).max(other.default_level.load(Ordering::Relaxed));
        LogLevelMap { default_level: AtomicUsize::new(default_level), by_name }
    }
}
