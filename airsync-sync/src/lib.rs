//! NTP-style offset/RTT/drift estimation from a bounded window of sync
//! exchanges.
//!
//! One exchange:
//! 1. sink stamps `t1` and sends `sync_request`
//! 2. source stamps `t2` on receipt and `t3` just before replying
//! 3. sink stamps `t4` on receipt of `sync_response`
//!
//! `rtt = (t4 - t1) - (t3 - t2)` is wire time with source-side
//! processing removed; `offset = ((t2 - t1) + (t3 - t4)) / 2` follows the
//! sign convention `source_time = local_time + offset`.

use std::collections::VecDeque;

use airsync_config::SYNC_SAMPLES;

/// One accepted sync exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    pub offset: f64,
    pub rtt: f64,
    pub at_local: f64,
}

/// Derives the sample for one exchange from its four timestamps. Does
/// not mutate any estimator state — call [`SyncEstimator::accept`] with
/// the result to fold it into the window.
pub fn sample_from_exchange(t1: f64, t2: f64, t3: f64, t4: f64) -> TimeSample {
    let rtt = (t4 - t1) - (t3 - t2);
    let offset = ((t2 - t1) + (t3 - t4)) / 2.0;
    TimeSample { offset, rtt, at_local: t4 }
}

/// A floor under `rtt` when used as an inverse weight, so a
/// near-zero-RTT sample (loopback, or a clock with coarse resolution)
/// can't dominate the effective offset to the point of division blowing
/// up.
const MIN_WEIGHT_RTT_MS: f64 = 0.1;

/// Bounded window of the most recent [`SYNC_SAMPLES`] time samples, plus
/// the derived aggregates a sink needs to schedule playout.
#[derive(Debug, Clone)]
pub struct SyncEstimator {
    samples: VecDeque<TimeSample>,
    converged: bool,
    last_sync_at: f64,
}

impl SyncEstimator {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(SYNC_SAMPLES),
            converged: false,
            last_sync_at: 0.0,
        }
    }

    /// Folds a newly derived sample into the window. Converged becomes
    /// true on first acceptance and never regresses within a session.
    pub fn accept(&mut self, sample: TimeSample) {
        if self.samples.len() == SYNC_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.converged = true;
        self.last_sync_at = sample.at_local;
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn last_sync_at(&self) -> f64 {
        self.last_sync_at
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// RTT-weighted mean offset: `weight = 1 / max(rtt, 0.1ms)`, so
    /// low-RTT samples dominate without outliers being discarded
    /// outright.
    pub fn effective_offset(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for s in &self.samples {
            let weight = 1.0 / s.rtt.max(MIN_WEIGHT_RTT_MS);
            weighted_sum += s.offset * weight;
            weight_total += weight;
        }
        weighted_sum / weight_total
    }

    /// RTT of the most recently accepted sample.
    pub fn rtt(&self) -> f64 {
        self.samples.back().map(|s| s.rtt).unwrap_or(0.0)
    }

    /// Slope of an OLS regression of `offset` on sample timestamp,
    /// scaled from ms/ms to ms/s. Diagnostic only — the core does not
    /// use this to pre-correct playout by default; `targetBufferMs`
    /// absorbs it instead.
    pub fn drift_ms_per_s(&self) -> f64 {
        let n = self.samples.len();
        if n < 2 {
            return 0.0;
        }
        let mean_t: f64 = self.samples.iter().map(|s| s.at_local).sum::<f64>() / n as f64;
        let mean_o: f64 = self.samples.iter().map(|s| s.offset).sum::<f64>() / n as f64;
        let mut num = 0.0;
        let mut den = 0.0;
        for s in &self.samples {
            let dt = s.at_local - mean_t;
            let doff = s.offset - mean_o;
            num += dt * doff;
            den += dt * dt;
        }
        if den == 0.0 {
            return 0.0;
        }
        (num / den) * 1_000.0
    }

    /// True when a resync should be scheduled: the estimator hasn't
    /// converged yet, or too long has elapsed since the last accepted
    /// sample.
    pub fn needs_resync(&self, now_local: f64, sync_interval_ms: f64) -> bool {
        !self.converged || (now_local - self.last_sync_at) > sync_interval_ms
    }

    /// Maps a source-stamped timestamp to this sink's local clock using
    /// the current effective offset: `local = source_time - offset`.
    pub fn source_to_local(&self, source_time: f64) -> f64 {
        source_time - self.effective_offset()
    }

    /// Like [`Self::source_to_local`] but with optional drift
    /// compensation: adds `drift × Δt` since the last accepted sync.
    /// Monotone-continuous across sync acceptance because `Δt` resets
    /// to zero exactly when `effective_offset` is recomputed from the
    /// new sample.
    pub fn source_to_local_drift_compensated(&self, source_time: f64, now_local: f64) -> f64 {
        let dt = (now_local - self.last_sync_at).max(0.0);
        let drift_ms = self.drift_ms_per_s() * (dt / 1_000.0);
        source_time - (self.effective_offset() + drift_ms)
    }
}

impl Default for SyncEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn scenario_non_zero_offset() {
        let sample = sample_from_exchange(0.0, 500.0, 500.0, 0.0);
        assert_eq!(sample.offset, 500.0);
        assert_eq!(sample.rtt, 0.0);
    }

    #[test]
    fn converged_never_regresses() {
        let mut est = SyncEstimator::new();
        assert!(!est.converged());
        est.accept(sample_from_exchange(0.0, 1.0, 1.0, 2.0));
        assert!(est.converged());
        // Feeding more samples, even degenerate ones, must not un-converge.
        est.accept(sample_from_exchange(0.0, 0.0, 0.0, 0.0));
        assert!(est.converged());
    }

    #[test]
    fn window_is_bounded() {
        let mut est = SyncEstimator::new();
        for i in 0..(SYNC_SAMPLES + 10) {
            est.accept(sample_from_exchange(0.0, i as f64, i as f64, i as f64 + 2.0));
        }
        assert_eq!(est.sample_count(), SYNC_SAMPLES);
    }

    #[test]
    fn needs_resync_before_first_sample() {
        let est = SyncEstimator::new();
        assert!(est.needs_resync(0.0, 1_000.0));
    }

    #[test]
    fn needs_resync_after_interval_elapses() {
        let mut est = SyncEstimator::new();
        est.accept(sample_from_exchange(0.0, 1.0, 1.0, 2.0));
        assert!(!est.needs_resync(500.0, 1_000.0));
        assert!(est.needs_resync(1_500.1, 1_000.0));
    }

    #[test]
    fn property_rtt_nonnegative_and_offset_bounded() {
        let mut rng = rand::rng();
        for _ in 0..10_000 {
            let t1 = rng.random_range(0.0..1e6);
            let t2 = t1 + rng.random_range(0.0..1e4);
            let t3 = t2 + rng.random_range(0.0..1e4);
            let t4 = t3 + rng.random_range(0.0..1e4);
            let s = sample_from_exchange(t1, t2, t3, t4);
            assert!(s.rtt >= 0.0, "rtt must be non-negative: {:?}", s);
            let bound = s.rtt / 2.0 + (t2 - t3).abs() / 2.0;
            assert!(s.offset.abs() <= bound + 1e-9, "offset {} exceeds bound {}", s.offset, bound);
        }
    }

    #[test]
    fn weighted_offset_is_monotone_in_weight() {
        // Two samples with opposite-sign offsets; lowering one's RTT
        // raises its weight and must pull the estimate toward it.
        let mut est = SyncEstimator::new();
        est.accept(TimeSample { offset: -100.0, rtt: 10.0, at_local: 1.0 });
        est.accept(TimeSample { offset: 100.0, rtt: 10.0, at_local: 2.0 });
        let balanced = est.effective_offset();
        assert!((balanced - 0.0).abs() < 1e-9);

        let mut est2 = SyncEstimator::new();
        est2.accept(TimeSample { offset: -100.0, rtt: 10.0, at_local: 1.0 });
        est2.accept(TimeSample { offset: 100.0, rtt: 1.0, at_local: 2.0 });
        let shifted = est2.effective_offset();
        assert!(shifted > balanced, "increasing a sample's weight should pull toward it");
    }

    #[test]
    fn source_to_local_uses_effective_offset() {
        let mut est = SyncEstimator::new();
        est.accept(sample_from_exchange(0.0, 500.0, 500.0, 0.0));
        assert_eq!(est.effective_offset(), 500.0);
        assert_eq!(est.source_to_local(520.0), 20.0);
    }
}
