//! Wait-free performance probes woven through the pipeline.
//!
//! Each [`MeasurementType`] gets its own striped ring buffer: writers pick a
//! stripe and `fetch_add` its cursor, so concurrent writers to different
//! stripes never contend and writers never block readers. `disabled()`
//! swaps in a variant that skips every write, modeled on the teacher's
//! habit of dispatching on a fixed enum (`VerificationKey`'s family enum,
//! the pipeline's own stage enum) rather than reaching for a trait object
//! on a hot path.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// The closed set of pipeline stages this crate measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementType {
    TokenParsing,
    HeaderValidation,
    SignatureValidation,
    ClaimsValidation,
    CacheLookup,
    CacheStore,
    KeyResolution,
    CompleteValidation,
}

impl MeasurementType {
    const ALL: &'static [MeasurementType] = &[
        Self::TokenParsing,
        Self::HeaderValidation,
        Self::SignatureValidation,
        Self::ClaimsValidation,
        Self::CacheLookup,
        Self::CacheStore,
        Self::KeyResolution,
        Self::CompleteValidation,
    ];

    fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }
}

const STRIPE_COUNT: usize = 8;

struct Stripe {
    samples: Box<[AtomicU64]>,
    cursor: AtomicUsize,
    filled: AtomicUsize,
}

impl Stripe {
    fn new(capacity: usize) -> Self {
        Self {
            samples: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            cursor: AtomicUsize::new(0),
            filled: AtomicUsize::new(0),
        }
    }

    fn record(&self, nanos: u64) {
        let len = self.samples.len();
        if len == 0 {
            return;
        }
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        if let Some(cell) = self.samples.get(slot) {
            cell.store(nanos, Ordering::Relaxed);
        }
        let filled = self.filled.load(Ordering::Relaxed);
        if filled < len {
            self.filled.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self, out: &mut Vec<u64>) {
        let filled = self.filled.load(Ordering::Relaxed).min(self.samples.len());
        out.extend(self.samples.iter().take(filled).map(|c| c.load(Ordering::Relaxed)));
    }
}

/// count, p50, p95, p99 (all durations in nanoseconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub count: usize,
    pub p50_nanos: u64,
    pub p95_nanos: u64,
    pub p99_nanos: u64,
}

fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64 - 1.0) * pct).round() as usize;
    let rank = rank.min(sorted.len().saturating_sub(1));
    sorted.get(rank).copied().unwrap_or(0)
}

/// A stack-allocated handle from [`ValidatorMonitor::start`]. Dropping or
/// simply not calling [`Ticker::stop_and_record`] is not an error — it
/// just records nothing, matching the "un-stopped ticker" contract.
pub struct Ticker<'a> {
    monitor: &'a ValidatorMonitor,
    measurement: MeasurementType,
    started_at: Option<Instant>,
}

impl Ticker<'_> {
    pub fn stop_and_record(self) {
        if let (ValidatorMonitor::Enabled(inner), Some(start)) = (self.monitor, self.started_at) {
            let nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
            inner.record(self.measurement, nanos);
        }
    }
}

/// Performance probe. The `Enabled` variant does real bookkeeping; the
/// `Disabled` variant is a no-op whose write path the compiler can inline
/// away entirely, since `start` never even reads an `Instant` on that path.
pub enum ValidatorMonitor {
    Enabled(EnabledMonitor),
    Disabled,
}

/// Per-measurement striped ring buffers.
pub struct EnabledMonitor {
    stripes: Vec<Vec<Stripe>>,
    /// One round-robin cursor per measurement type, used only to spread
    /// writes across stripes; never read for timing data.
    stripe_picker: Vec<AtomicUsize>,
}

impl EnabledMonitor {
    fn new(window_size: usize) -> Self {
        let per_stripe = (window_size / STRIPE_COUNT).max(1);
        let stripes = MeasurementType::ALL
            .iter()
            .map(|_| (0..STRIPE_COUNT).map(|_| Stripe::new(per_stripe)).collect())
            .collect();
        let stripe_picker = MeasurementType::ALL.iter().map(|_| AtomicUsize::new(0)).collect();
        Self { stripes, stripe_picker }
    }

    fn record(&self, measurement: MeasurementType, nanos: u64) {
        let idx = measurement.index();
        let Some(stripes) = self.stripes.get(idx) else {
            return;
        };
        let Some(picker) = self.stripe_picker.get(idx) else {
            return;
        };
        let stripe_idx = picker.fetch_add(1, Ordering::Relaxed) % STRIPE_COUNT.max(1);
        if let Some(stripe) = stripes.get(stripe_idx) {
            stripe.record(nanos);
        }
    }

    fn statistics(&self, measurement: MeasurementType) -> Statistics {
        let Some(stripes) = self.stripes.get(measurement.index()) else {
            return Statistics::default();
        };
        let mut samples = Vec::new();
        for stripe in stripes {
            stripe.snapshot(&mut samples);
        }
        samples.sort_unstable();
        Statistics {
            count: samples.len(),
            p50_nanos: percentile(&samples, 0.50),
            p95_nanos: percentile(&samples, 0.95),
            p99_nanos: percentile(&samples, 0.99),
        }
    }
}

impl ValidatorMonitor {
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self::Enabled(EnabledMonitor::new(window_size))
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::Disabled
    }

    #[must_use]
    pub fn from_config(config: &crate::config::MonitorConfig) -> Self {
        if config.enabled {
            Self::new(config.window_size)
        } else {
            Self::Disabled
        }
    }

    /// Starts timing `measurement`. On the disabled path this does not
    /// even read the clock.
    #[must_use]
    pub fn start(&self, measurement: MeasurementType) -> Ticker<'_> {
        let started_at = match self {
            Self::Enabled(_) => Some(Instant::now()),
            Self::Disabled => None,
        };
        Ticker {
            monitor: self,
            measurement,
            started_at,
        }
    }

    #[must_use]
    pub fn statistics(&self, measurement: MeasurementType) -> Statistics {
        match self {
            Self::Enabled(inner) => inner.statistics(measurement),
            Self::Disabled => Statistics::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn disabled_monitor_reports_zero_counts() {
        let monitor = ValidatorMonitor::disabled();
        let ticker = monitor.start(MeasurementType::TokenParsing);
        ticker.stop_and_record();
        let stats = monitor.statistics(MeasurementType::TokenParsing);
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn enabled_monitor_records_a_sample() {
        let monitor = ValidatorMonitor::new(800);
        let ticker = monitor.start(MeasurementType::CacheLookup);
        std::thread::sleep(std::time::Duration::from_micros(10));
        ticker.stop_and_record();

        let stats = monitor.statistics(MeasurementType::CacheLookup);
        assert_eq!(stats.count, 1);
        assert!(stats.p50_nanos > 0);
    }

    #[test]
    fn percentiles_are_monotonic_under_load() {
        let monitor = ValidatorMonitor::new(8000);
        for i in 0..500u64 {
            let ticker = monitor.start(MeasurementType::ClaimsValidation);
            // Synthesize varied durations without sleeping 500 times.
            if let ValidatorMonitor::Enabled(inner) = &monitor {
                inner.record(MeasurementType::ClaimsValidation, i * 1000);
            }
            ticker.stop_and_record();
        }
        let stats = monitor.statistics(MeasurementType::ClaimsValidation);
        assert!(stats.p50_nanos <= stats.p95_nanos);
        assert!(stats.p95_nanos <= stats.p99_nanos);
    }

    #[test]
    fn unstopped_ticker_records_nothing() {
        let monitor = ValidatorMonitor::new(80);
        {
            let _ticker = monitor.start(MeasurementType::KeyResolution);
            // dropped without calling stop_and_record
        }
        let stats = monitor.statistics(MeasurementType::KeyResolution);
        assert_eq!(stats.count, 0);
    }
}
