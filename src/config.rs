//! Governor tunables.
//!
//! Every parameter carries a declared valid range and is exposed through a
//! textual key/value surface (`get_text` / `set_text`). Writes are validated
//! against the *incoming* value; a rejected write leaves the stored value
//! unchanged and logs a diagnostic. Applying the structural side effects of a
//! write (re-arming at a new sample rate, reconciling core bounds) is the
//! governor actor's job, not the store's.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which decision policy drives the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Fixed target load with a hysteresis counter.
    ThresholdHysteresis,
    /// Histogram-predicted target load, then the hysteresis step.
    PredictiveHistogram,
}

/// Which direction the larger hysteresis step applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingBias {
    /// Sustained low load accumulates faster — cores come offline sooner.
    OfflineFaster,
    /// Sustained high load accumulates faster — cores come online sooner.
    OnlineFaster,
}

/// Tunable governor parameters. See the module docs for mutation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Tick period in milliseconds; also scales the hysteresis threshold.
    pub sample_rate_ms: u64,
    /// Ceiling on active cores.
    pub max_cpus: u32,
    /// Floor on active cores.
    pub min_cpus: u32,
    /// Gates the touch boost override.
    pub touch_boost_enabled: bool,
    /// Selected decision policy.
    pub policy: PolicyKind,
    /// Fixed target for the hysteresis policy (ignored under the predictive
    /// policy, which computes its own).
    pub target_load: u32,
    /// Step size applied to the biased direction.
    pub dispatch_rate: u32,
    /// Which direction gets the larger step.
    pub biased_down_up: ScalingBias,
    /// Floor applied to the predictive policy's computed target.
    pub min_target_load: u32,
    /// Hardware core count; fixed at construction, not writable.
    nr_cpus: u32,
}

/// Valid range for `sample_rate_ms`.
const SAMPLE_RATE_RANGE: (u64, u64) = (10, 60_000);
/// Valid range for `dispatch_rate`.
const DISPATCH_RATE_RANGE: (u64, u64) = (1, 100);

impl GovernorConfig {
    /// All writable parameter keys, in display order.
    pub const KEYS: &'static [&'static str] = &[
        "sample_rate",
        "max_cpus",
        "min_cpus",
        "touch_boost_enabled",
        "policy",
        "target_load",
        "dispatch_rate",
        "biased_down_up",
        "min_target_load",
    ];

    /// Defaults for a machine with `nr_cpus` hardware cores.
    ///
    /// The stock ceiling of 6 cores is clamped to the topology.
    pub fn for_topology(nr_cpus: u32) -> Self {
        let nr_cpus = nr_cpus.max(1);
        Self {
            sample_rate_ms: 250,
            max_cpus: 6.min(nr_cpus),
            min_cpus: 1,
            touch_boost_enabled: true,
            policy: PolicyKind::ThresholdHysteresis,
            target_load: 40,
            dispatch_rate: 2,
            biased_down_up: ScalingBias::OfflineFaster,
            min_target_load: 50,
            nr_cpus,
        }
    }

    /// Hardware core count this config was built for.
    pub fn nr_cpus(&self) -> u32 {
        self.nr_cpus
    }

    /// Read a parameter as text. Returns `None` for unknown keys.
    pub fn get_text(&self, key: &str) -> Option<String> {
        let v = match key {
            "sample_rate" => self.sample_rate_ms.to_string(),
            "max_cpus" => self.max_cpus.to_string(),
            "min_cpus" => self.min_cpus.to_string(),
            "touch_boost_enabled" => (self.touch_boost_enabled as u32).to_string(),
            "policy" => policy_name(self.policy).to_string(),
            "target_load" => self.target_load.to_string(),
            "dispatch_rate" => self.dispatch_rate.to_string(),
            "biased_down_up" => bias_name(self.biased_down_up).to_string(),
            "min_target_load" => self.min_target_load.to_string(),
            _ => return None,
        };
        Some(v)
    }

    /// Validated write of a parameter from text.
    ///
    /// The incoming value is parsed and range-checked before anything is
    /// stored; on any error the prior value is retained.
    pub fn set_text(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let result = match key {
            "sample_rate" => {
                parse_ranged("sample_rate", value, SAMPLE_RATE_RANGE)
                    .map(|v| self.sample_rate_ms = v)
            }
            "max_cpus" => parse_ranged("max_cpus", value, (self.min_cpus as u64, self.nr_cpus as u64))
                .map(|v| self.max_cpus = v as u32),
            "min_cpus" => parse_ranged("min_cpus", value, (1, self.max_cpus as u64))
                .map(|v| self.min_cpus = v as u32),
            "touch_boost_enabled" => {
                parse_bool("touch_boost_enabled", value).map(|v| self.touch_boost_enabled = v)
            }
            "policy" => parse_policy(value).map(|v| self.policy = v),
            "target_load" => parse_ranged("target_load", value, (0, 100))
                .map(|v| self.target_load = v as u32),
            "dispatch_rate" => parse_ranged("dispatch_rate", value, DISPATCH_RATE_RANGE)
                .map(|v| self.dispatch_rate = v as u32),
            "biased_down_up" => parse_bias(value).map(|v| self.biased_down_up = v),
            "min_target_load" => parse_ranged("min_target_load", value, (0, 100))
                .map(|v| self.min_target_load = v as u32),
            _ => Err(ConfigError::UnknownKey {
                key: key.to_string(),
            }),
        };

        if let Err(ref e) = result {
            warn!("config write rejected: {}", e);
        }
        result
    }
}

fn policy_name(p: PolicyKind) -> &'static str {
    match p {
        PolicyKind::ThresholdHysteresis => "threshold_hysteresis",
        PolicyKind::PredictiveHistogram => "predictive_histogram",
    }
}

fn bias_name(b: ScalingBias) -> &'static str {
    match b {
        ScalingBias::OfflineFaster => "offline_faster",
        ScalingBias::OnlineFaster => "online_faster",
    }
}

fn parse_ranged(key: &'static str, value: &str, (min, max): (u64, u64)) -> Result<u64, ConfigError> {
    let v: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: "expected an unsigned integer",
    })?;
    if v < min || v > max {
        return Err(ConfigError::OutOfRange {
            key,
            value: v,
            min,
            max,
        });
    }
    Ok(v)
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected 0/1, true/false, or on/off",
        }),
    }
}

fn parse_policy(value: &str) -> Result<PolicyKind, ConfigError> {
    match value {
        "threshold_hysteresis" => Ok(PolicyKind::ThresholdHysteresis),
        "predictive_histogram" => Ok(PolicyKind::PredictiveHistogram),
        _ => Err(ConfigError::InvalidValue {
            key: "policy",
            value: value.to_string(),
            reason: "expected threshold_hysteresis or predictive_histogram",
        }),
    }
}

fn parse_bias(value: &str) -> Result<ScalingBias, ConfigError> {
    match value {
        "offline_faster" => Ok(ScalingBias::OfflineFaster),
        "online_faster" => Ok(ScalingBias::OnlineFaster),
        _ => Err(ConfigError::InvalidValue {
            key: "biased_down_up",
            value: value.to_string(),
            reason: "expected offline_faster or online_faster",
        }),
    }
}
