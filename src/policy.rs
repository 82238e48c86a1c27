//! Tick decision policies.
//!
//! Two strategies over the same aggregated load signal: a fixed-target
//! hysteresis counter, and a histogram-based predictor that derives an
//! adaptive target from the observed load distribution and then runs the
//! same hysteresis step with it. Sustained pressure above the target drives
//! the counter negative (toward `Up`), sustained pressure below drives it
//! positive (toward `Down`); crossing the scaled threshold emits the
//! decision and resets the counter.

use crate::config::{GovernorConfig, PolicyKind, ScalingBias};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Disabled,
    Idle,
    Down,
    Up,
}

/// Hysteresis threshold for a given tick period: `sample_rate_ms / 10`.
///
/// At the stock 250 ms period this is 25, so a one-per-tick step sustains
/// for 25 ticks before a transition fires.
pub fn scaled_threshold(sample_rate_ms: u64) -> i64 {
    (sample_rate_ms * 100 / 1000) as i64
}

/// Signed accumulator for the threshold-hysteresis policy.
#[derive(Debug, Default)]
pub struct HysteresisState {
    counter: i64,
}

impl HysteresisState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> i64 {
        self.counter
    }
}

/// Inputs to one hysteresis step.
#[derive(Debug, Clone, Copy)]
pub struct HysteresisParams {
    pub target_load: u32,
    pub dispatch_rate: u32,
    pub bias: ScalingBias,
    pub sample_rate_ms: u64,
}

impl HysteresisState {
    /// One tick of the threshold-hysteresis policy.
    pub fn evaluate(&mut self, avg_load: u32, p: &HysteresisParams) -> Decision {
        let threshold = scaled_threshold(p.sample_rate_ms);
        let step = i64::from(p.dispatch_rate);

        if avg_load > p.target_load {
            // The larger step applies here only when onlining is the favored
            // direction.
            self.counter -= if p.bias == ScalingBias::OnlineFaster {
                step
            } else {
                1
            };
        } else if avg_load < p.target_load {
            self.counter += if p.bias == ScalingBias::OfflineFaster {
                step
            } else {
                1
            };
        }

        if self.counter >= threshold {
            self.counter = 0;
            Decision::Down
        } else if self.counter <= -threshold {
            self.counter = 0;
            Decision::Up
        } else {
            Decision::Idle
        }
    }
}

/// Decile occurrence counts for the predictive policy.
///
/// Nine buckets over 0–100% load, the top bucket covering 80–100%. Counts
/// only grow; the distribution persists for the governor's lifetime. The
/// top bucket is seeded at 1.
#[derive(Debug)]
pub struct LoadHistogram {
    buckets: [u64; 9],
}

impl Default for LoadHistogram {
    fn default() -> Self {
        Self {
            buckets: [0, 0, 0, 0, 0, 0, 0, 0, 1],
        }
    }
}

fn bucket_of(avg_load: u32) -> usize {
    ((avg_load / 10) as usize).min(8)
}

impl LoadHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buckets(&self) -> &[u64; 9] {
        &self.buckets
    }

    /// Record one observation and return the predicted dominant decile.
    ///
    /// The current bucket is compared against its immediate neighbors; the
    /// one with the higher count wins. At the low boundary a tie keeps the
    /// current bucket; in the interior, ties against the lower neighbor keep
    /// the current bucket and the remaining tie prefers the upper neighbor.
    fn observe(&mut self, avg_load: u32) -> usize {
        let d = bucket_of(avg_load);
        self.buckets[d] += 1;
        let b = &self.buckets;
        match d {
            0 => {
                if b[1] > b[0] {
                    1
                } else {
                    0
                }
            }
            8 => {
                if b[7] > b[8] {
                    7
                } else {
                    8
                }
            }
            _ => {
                if b[d - 1] > b[d] {
                    if b[d - 1] > b[d + 1] {
                        d - 1
                    } else {
                        d + 1
                    }
                } else if b[d] > b[d + 1] {
                    d
                } else {
                    d + 1
                }
            }
        }
    }

    /// Adaptive target load for this observation, floored at
    /// `min_target_load`.
    pub fn predict_target(&mut self, avg_load: u32, min_target_load: u32) -> u32 {
        let response_index = self.observe(avg_load);
        let target = 100 - (response_index as u32) * 10;
        target.max(min_target_load)
    }
}

/// Combined policy state owned by the governor.
///
/// Both strategies' state persists across policy switches: the hysteresis
/// counter carries over and the histogram is never reset.
#[derive(Debug, Default)]
pub struct PolicyState {
    pub hysteresis: HysteresisState,
    pub histogram: LoadHistogram,
}

impl PolicyState {
    pub fn new() -> Self {
        Self {
            hysteresis: HysteresisState::new(),
            histogram: LoadHistogram::new(),
        }
    }

    /// Evaluate the configured policy for one tick.
    ///
    /// Returns the decision and the target load that was actually in effect
    /// (the configured one, or the histogram's prediction).
    pub fn evaluate(&mut self, avg_load: u32, cfg: &GovernorConfig) -> (Decision, u32) {
        let target_load = match cfg.policy {
            PolicyKind::ThresholdHysteresis => cfg.target_load,
            PolicyKind::PredictiveHistogram => {
                let t = self
                    .histogram
                    .predict_target(avg_load, cfg.min_target_load);
                debug!(
                    "predictive target {} (history {:?})",
                    t,
                    self.histogram.buckets()
                );
                t
            }
        };
        let params = HysteresisParams {
            target_load,
            dispatch_rate: cfg.dispatch_rate,
            bias: cfg.biased_down_up,
            sample_rate_ms: cfg.sample_rate_ms,
        };
        let decision = self.hysteresis.evaluate(avg_load, &params);
        debug!(
            "avg load {} target {} counter {} -> {:?}",
            avg_load,
            target_load,
            self.hysteresis.counter(),
            decision
        );
        (decision, target_load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(target: u32, dispatch: u32, bias: ScalingBias) -> HysteresisParams {
        HysteresisParams {
            target_load: target,
            dispatch_rate: dispatch,
            bias,
            sample_rate_ms: 250,
        }
    }

    #[test]
    fn test_scaled_threshold() {
        assert_eq!(scaled_threshold(250), 25);
        assert_eq!(scaled_threshold(1000), 100);
        assert_eq!(scaled_threshold(10), 1);
    }

    #[test]
    fn test_sustained_high_load_goes_up_on_tick_25() {
        // OfflineFaster: the high-load direction steps by 1 per tick.
        let mut h = HysteresisState::new();
        let p = params(40, 2, ScalingBias::OfflineFaster);
        for tick in 1..=24 {
            assert_eq!(h.evaluate(80, &p), Decision::Idle, "tick {tick}");
        }
        assert_eq!(h.evaluate(80, &p), Decision::Up);
        assert_eq!(h.counter(), 0);
    }

    #[test]
    fn test_online_faster_bias_goes_up_on_tick_13() {
        // OnlineFaster: the high-load direction steps by dispatch_rate = 2,
        // crossing the threshold of 25 on tick 13.
        let mut h = HysteresisState::new();
        let p = params(40, 2, ScalingBias::OnlineFaster);
        for tick in 1..=12 {
            assert_eq!(h.evaluate(80, &p), Decision::Idle, "tick {tick}");
        }
        assert_eq!(h.evaluate(80, &p), Decision::Up);
    }

    #[test]
    fn test_sustained_low_load_goes_down() {
        // OfflineFaster: the low-load direction steps by 2, Down on tick 13.
        let mut h = HysteresisState::new();
        let p = params(40, 2, ScalingBias::OfflineFaster);
        for _ in 1..=12 {
            assert_eq!(h.evaluate(10, &p), Decision::Idle);
        }
        assert_eq!(h.evaluate(10, &p), Decision::Down);

        // OnlineFaster: low-load steps by 1, Down on tick 25.
        let mut h = HysteresisState::new();
        let p = params(40, 2, ScalingBias::OnlineFaster);
        for _ in 1..=24 {
            assert_eq!(h.evaluate(10, &p), Decision::Idle);
        }
        assert_eq!(h.evaluate(10, &p), Decision::Down);
    }

    #[test]
    fn test_load_at_target_holds_counter() {
        let mut h = HysteresisState::new();
        let p = params(40, 2, ScalingBias::OfflineFaster);
        for _ in 0..100 {
            assert_eq!(h.evaluate(40, &p), Decision::Idle);
        }
        assert_eq!(h.counter(), 0);
    }

    #[test]
    fn test_counter_resets_after_trigger() {
        let mut h = HysteresisState::new();
        let p = params(40, 2, ScalingBias::OfflineFaster);
        for _ in 0..24 {
            h.evaluate(80, &p);
        }
        assert_eq!(h.evaluate(80, &p), Decision::Up);
        // Pressure must rebuild from scratch
        for _ in 0..24 {
            assert_eq!(h.evaluate(80, &p), Decision::Idle);
        }
        assert_eq!(h.evaluate(80, &p), Decision::Up);
    }

    #[test]
    fn test_opposing_pressure_cancels() {
        let mut h = HysteresisState::new();
        let p = params(40, 1, ScalingBias::OfflineFaster);
        for _ in 0..10 {
            h.evaluate(80, &p);
        }
        for _ in 0..10 {
            h.evaluate(10, &p);
        }
        assert_eq!(h.counter(), 0);
    }

    #[test]
    fn test_bucket_clamp() {
        assert_eq!(bucket_of(0), 0);
        assert_eq!(bucket_of(9), 0);
        assert_eq!(bucket_of(79), 7);
        assert_eq!(bucket_of(80), 8);
        assert_eq!(bucket_of(95), 8);
        assert_eq!(bucket_of(100), 8);
    }

    #[test]
    fn test_histogram_seed() {
        let hist = LoadHistogram::new();
        assert_eq!(hist.buckets(), &[0, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_predict_never_below_floor() {
        let mut hist = LoadHistogram::new();
        for avg in (0..=100).step_by(5) {
            assert!(hist.predict_target(avg, 50) >= 50);
        }
    }

    #[test]
    fn test_top_bucket_dominates_after_high_load_history() {
        let mut hist = LoadHistogram::new();
        // A history of very high load keeps the response in the top decile,
        // so the raw target (100 - 80 = 20) hits the floor.
        for _ in 0..20 {
            assert_eq!(hist.predict_target(90, 50), 50);
        }
        assert_eq!(hist.buckets()[8], 21);
    }

    #[test]
    fn test_low_boundary_tie_keeps_current_bucket() {
        let mut hist = LoadHistogram::new();
        // First low observation: buckets[0] = 1, buckets[1] = 0 -> response 0
        assert_eq!(hist.predict_target(5, 0), 100);
    }

    #[test]
    fn test_low_boundary_defers_to_busier_neighbor() {
        let mut hist = LoadHistogram::new();
        hist.predict_target(15, 0);
        hist.predict_target(15, 0); // buckets[1] = 2
        // buckets[1] (2) > buckets[0] (1) -> response 1, target 90
        assert_eq!(hist.predict_target(5, 0), 90);
    }

    #[test]
    fn test_interior_prefers_upper_neighbor_on_tie() {
        let mut hist = LoadHistogram::new();
        // buckets[4] = 1, buckets[3] = buckets[5] = 0: current bucket is not
        // outnumbered below and equals the count above... the upper neighbor
        // only wins once it is at least as busy.
        assert_eq!(hist.predict_target(45, 0), 60); // response 4
        hist.predict_target(55, 0); // buckets[5] = 1, ties buckets[4]
        hist.predict_target(55, 0); // buckets[5] = 2 now exceeds
        assert_eq!(hist.predict_target(45, 0), 50); // response 5
    }

    #[test]
    fn test_interior_lower_neighbor_wins_when_dominant() {
        let mut hist = LoadHistogram::new();
        for _ in 0..5 {
            hist.predict_target(35, 0); // buckets[3] = 5
        }
        // d = 4: buckets[3] (5) > buckets[4] (1) and > buckets[5] (0)
        assert_eq!(hist.predict_target(45, 0), 70); // response 3
    }

    #[test]
    fn test_policy_state_predictive_delegates_to_hysteresis() {
        let mut cfg = crate::config::GovernorConfig::for_topology(6);
        cfg.policy = PolicyKind::PredictiveHistogram;
        let mut state = PolicyState::new();
        let (decision, target) = state.evaluate(90, &cfg);
        // Single high observation: effective target floored at 50, load 90
        // above it, counter moves but stays inside the threshold.
        assert_eq!(decision, Decision::Idle);
        assert_eq!(target, 50);
        assert!(state.hysteresis.counter() < 0);
        // The configured fixed target is left untouched.
        assert_eq!(cfg.target_load, 40);
    }
}
