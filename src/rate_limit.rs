//! The rate-limiter family: counting (`every(N)`), sampling
//! (`onAverageEvery(N)`) and duration (`atMostEvery(n, unit)`), combined
//! through a common tri-state [`RateLimitStatus`] protocol, plus the per-key
//! skipped-observation counter that feeds `SKIPPED_LOG_COUNT`.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::log_site::SiteKeyHandle;
use crate::log_site_map::LogSiteMap;
use crate::metadata::Metadata;

/// A stateful rate-limit outcome. `reset()` is called exactly once per
/// emission, after the pipeline has committed to logging.
pub trait StatefulStatus: Send + Sync {
    fn reset(&self);
}

/// Tri-state result of a rate-limiter check. `Allow`/`Disallow` are
/// stateless sentinels; anything else carries limiter state that must be
/// `reset()` on successful emission.
#[derive(Clone)]
pub enum RateLimitStatus {
    Allow,
    Disallow,
    Stateful(Arc<dyn StatefulStatus>),
}

impl RateLimitStatus {
    /// `None` means "no limiter had an opinion". Order of arguments does not
    /// matter except that `Disallow` always wins and two stateful statuses
    /// combine into a composite that resets both.
    pub fn combine(a: Option<RateLimitStatus>, b: Option<RateLimitStatus>) -> Option<RateLimitStatus> {
        match (a, b) {
            (None, None) => None,
            (None, Some(x)) => Some(x),
            (Some(x), None) => Some(x),
            (Some(RateLimitStatus::Disallow), _) => Some(RateLimitStatus::Disallow),
            (_, Some(RateLimitStatus::Disallow)) => Some(RateLimitStatus::Disallow),
            (Some(RateLimitStatus::Allow), Some(x)) => Some(x),
            (Some(x), Some(RateLimitStatus::Allow)) => Some(x),
            (Some(RateLimitStatus::Stateful(x)), Some(RateLimitStatus::Stateful(y))) => {
                Some(RateLimitStatus::Stateful(Arc::new(CompositeStatus(vec![x, y]))))
            }
        }
    }
}

/// Resets every constituent of a merged status exactly once. A panic from one
/// constituent's `reset()` does not stop the others from resetting; it is
/// re-raised only after every constituent has had its turn.
struct CompositeStatus(Vec<Arc<dyn StatefulStatus>>);

impl StatefulStatus for CompositeStatus {
    fn reset(&self) {
        let mut pending_panic = None;
        for status in &self.0 {
            let status = status.clone();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| status.reset()));
            if let Err(payload) = outcome {
                if pending_panic.is_none() {
                    pending_panic = Some(payload);
                }
            }
        }
        if let Some(payload) = pending_panic {
            std::panic::resume_unwind(payload);
        }
    }
}

/// Applies a combined status: increments/clears the per-key skip counter and
/// returns the skipped-count to carry into `SKIPPED_LOG_COUNT`, or `-1` if
/// the call should not log at all.
pub fn check_status(
    status: Option<RateLimitStatus>,
    key: &SiteKeyHandle,
    skip_counters: &Arc<LogSiteMap<AtomicUsize>>,
    metadata: &Metadata,
) -> i64 {
    match status {
        None => 0,
        Some(RateLimitStatus::Disallow) => {
            let counter = skip_counters.get(key.clone(), metadata);
            counter.fetch_add(1, Ordering::Relaxed);
            -1
        }
        Some(RateLimitStatus::Allow) => {
            let counter = skip_counters.get(key.clone(), metadata);
            counter.swap(0, Ordering::Relaxed) as i64
        }
        Some(RateLimitStatus::Stateful(stateful)) => {
            let counter = skip_counters.get(key.clone(), metadata);
            let skipped = counter.swap(0, Ordering::Relaxed) as i64;
            stateful.reset();
            skipped
        }
    }
}

/// `every(N)` state: emits on the 1st, Nth, 2Nth, ... observation.
///
/// `count == u64::MAX` is a sentinel for "never observed": the initial value
/// is effectively one below the first threshold, concretized here since the
/// threshold `N` is not known at default-construction time.
pub struct CountingLimiterState {
    count: AtomicU64,
}

impl Default for CountingLimiterState {
    fn default() -> Self {
        Self { count: AtomicU64::new(u64::MAX) }
    }
}

impl CountingLimiterState {
    pub fn check(self: &Arc<Self>, n: u64) -> Option<RateLimitStatus> {
        loop {
            let cur = self.count.load(Ordering::Relaxed);
            let effective = if cur == u64::MAX { n.saturating_sub(1) } else { cur };
            let next = effective + 1;
            if self.count.compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
                return if next >= n { Some(RateLimitStatus::Stateful(self.clone())) } else { Some(RateLimitStatus::Disallow) };
            }
        }
    }
}

impl StatefulStatus for CountingLimiterState {
    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

/// `onAverageEvery(N)` state: a per-key pending counter driven by a
/// thread-local RNG draw.
pub struct SamplingLimiterState {
    pending: AtomicI64,
}

impl Default for SamplingLimiterState {
    fn default() -> Self {
        Self { pending: AtomicI64::new(0) }
    }
}

impl SamplingLimiterState {
    pub fn check(self: &Arc<Self>, n: i64) -> Option<RateLimitStatus> {
        if n <= 0 {
            return None;
        }
        let draw: i64 = rand::thread_rng().gen_range(0..n);
        if draw == 0 {
            self.pending.fetch_add(1, Ordering::Relaxed);
        }
        if self.pending.load(Ordering::Relaxed) > 0 {
            Some(RateLimitStatus::Stateful(self.clone()))
        } else {
            Some(RateLimitStatus::Disallow)
        }
    }
}

impl StatefulStatus for SamplingLimiterState {
    fn reset(&self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
    }
}

/// `atMostEvery(n, unit)` state: a single sign-encoded timestamp. `>= 0`
/// means "limiting" (the last allowed-emission time), `< 0` means "pending"
/// (an emission has been granted but not yet `reset()`). `i64::MIN` is the
/// "never observed" sentinel; it is never reachable again once a real
/// timestamp (always `> i64::MIN`) is stored.
pub struct DurationLimiterState {
    last: AtomicI64,
}

impl Default for DurationLimiterState {
    fn default() -> Self {
        Self { last: AtomicI64::new(i64::MIN) }
    }
}

impl DurationLimiterState {
    pub fn check(self: &Arc<Self>, now_nanos: i64, period_nanos: i64) -> Option<RateLimitStatus> {
        loop {
            let cur = self.last.load(Ordering::Relaxed);
            if cur < 0 {
                // Already pending (includes the i64::MIN "never observed"
                // sentinel, which is itself negative and transitions on the
                // very first observation below).
                if cur == i64::MIN {
                    if self.last.compare_exchange(cur, -now_nanos, Ordering::AcqRel, Ordering::Relaxed).is_err() {
                        continue;
                    }
                }
                return Some(RateLimitStatus::Stateful(self.clone()));
            }
            let deadline = match cur.checked_add(period_nanos) {
                Some(d) => d,
                None => return Some(RateLimitStatus::Disallow),
            };
            if now_nanos < deadline {
                return Some(RateLimitStatus::Disallow);
            }
            if self.last.compare_exchange(cur, -now_nanos, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
                return Some(RateLimitStatus::Stateful(self.clone()));
            }
        }
    }
}

impl StatefulStatus for DurationLimiterState {
    fn reset(&self) {
        loop {
            let cur = self.last.load(Ordering::Relaxed);
            let candidate = cur.checked_neg().unwrap_or(i64::MAX).max(0);
            if self.last.compare_exchange(cur, candidate, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
                return;
            }
        }
    }
}

/// A unit for [`RateLimitPeriod`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimeUnit {
    Nanos,
    Micros,
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn nanos_per_unit(self) -> u64 {
        match self {
            TimeUnit::Nanos => 1,
            TimeUnit::Micros => 1_000,
            TimeUnit::Millis => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 60 * 60 * 1_000_000_000,
            TimeUnit::Days => 24 * 60 * 60 * 1_000_000_000,
        }
    }

    fn abbrev(self) -> &'static str {
        match self {
            TimeUnit::Nanos => "ns",
            TimeUnit::Micros => "us",
            TimeUnit::Millis => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "m",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }
}

/// `(n, unit)` for `atMostEvery`, cached onto metadata as-is.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitPeriod {
    pub n: u64,
    pub unit: TimeUnit,
}

impl RateLimitPeriod {
    pub fn new(n: u64, unit: TimeUnit) -> Self {
        Self { n, unit }
    }

    /// Saturates rather than panics on overflow, feeding the duration
    /// limiter's "deadline overflowed" disallow path instead of a panic.
    pub fn to_nanos(&self) -> i64 {
        let total = self.n.saturating_mul(unit_nanos(self.unit));
        total.min(i64::MAX as u64) as i64
    }
}

fn unit_nanos(unit: TimeUnit) -> u64 {
    unit.nanos_per_unit()
}

impl fmt::Display for RateLimitPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.n, self.unit.abbrev())
    }
}

/// Process-wide per-log-site state for all three limiter families, plus the
/// skip counters `check_status` maintains. Shared across every `Logger`
/// instance: these rate limiters are per-*site*, not per-logger.
pub struct RateLimiters {
    counting: Arc<LogSiteMap<CountingLimiterState>>,
    sampling: Arc<LogSiteMap<SamplingLimiterState>>,
    duration: Arc<LogSiteMap<DurationLimiterState>>,
    skip_counters: Arc<LogSiteMap<AtomicUsize>>,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self {
            counting: Arc::new(LogSiteMap::new()),
            sampling: Arc::new(LogSiteMap::new()),
            duration: Arc::new(LogSiteMap::new()),
            skip_counters: Arc::new(LogSiteMap::new()),
        }
    }

    /// Runs the three limiter families in a fixed order (Duration, Counting,
    /// Sampling) and combines their statuses.
    pub fn combined_status(&self, key: &SiteKeyHandle, metadata: &Metadata, now_nanos: i64) -> Option<RateLimitStatus> {
        let mut status = None;

        if let Some(period) = metadata.find_value(&crate::metadata::LOG_AT_MOST_EVERY) {
            let state = self.duration.get(key.clone(), metadata);
            status = RateLimitStatus::combine(status, state.check(now_nanos, period.to_nanos()));
        }
        if let Some(n) = metadata.find_value(&crate::metadata::LOG_EVERY_N) {
            let state = self.counting.get(key.clone(), metadata);
            status = RateLimitStatus::combine(status, state.check(*n as u64));
        }
        if let Some(n) = metadata.find_value(&crate::metadata::LOG_SAMPLE_EVERY_N) {
            let state = self.sampling.get(key.clone(), metadata);
            status = RateLimitStatus::combine(status, state.check(*n as i64));
        }
        status
    }

    pub fn check_and_clear_skips(&self, status: Option<RateLimitStatus>, key: &SiteKeyHandle, metadata: &Metadata) -> i64 {
        check_status(status, key, &self.skip_counters, metadata)
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    pub static ref RATE_LIMITERS: RateLimiters = RateLimiters::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_site::LogSite;
    use crate::metadata::MutableMetadata;
    use std::sync::Arc as StdArc;

    fn key() -> SiteKeyHandle {
        SiteKeyHandle::new(StdArc::new(LogSite::new("C", "m", 1, None)))
    }

    #[test]
    fn every_n_emits_at_zero_n_minus_one_two_n_minus_one() {
        let limiters = RateLimiters::new();
        let k = key();
        let md = MutableMetadata::new();
        let mut emissions = Vec::new();
        for i in 0..11u32 {
            let mut m = MutableMetadata::new();
            m.add(&crate::metadata::LOG_EVERY_N, 5u32);
            let status = limiters.combined_status(&k, &m.view(), i as i64);
            let skipped = limiters.check_and_clear_skips(status, &k, &m.view());
            if skipped >= 0 {
                emissions.push((i, skipped));
            }
        }
        let _ = md;
        assert_eq!(emissions, vec![(0, 0), (5, 4), (10, 4)]);
    }

    #[test]
    fn composite_reset_runs_both_even_if_one_panics() {
        struct Boom;
        impl StatefulStatus for Boom {
            fn reset(&self) {
                panic!("boom");
            }
        }
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        struct Mark(Arc<std::sync::atomic::AtomicBool>);
        impl StatefulStatus for Mark {
            fn reset(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let composite = CompositeStatus(vec![Arc::new(Boom), Arc::new(Mark(ran.clone()))]);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| composite.reset()));
        assert!(result.is_err());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn duration_limiter_emits_then_waits_for_period() {
        let state: Arc<DurationLimiterState> = Arc::new(DurationLimiterState::default());
        let period = 1_000_000_000i64; // 1s
        assert!(matches!(state.check(0, period), Some(RateLimitStatus::Stateful(_))));
        if let Some(RateLimitStatus::Stateful(s)) = state.check(0, period) {
            s.reset();
        }
        assert!(matches!(state.check(500_000_000, period), Some(RateLimitStatus::Disallow)));
        assert!(matches!(state.check(1_000_000_000, period), Some(RateLimitStatus::Stateful(_))));
    }
}
