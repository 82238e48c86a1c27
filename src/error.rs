//! Error taxonomy for the governor core.
//!
//! None of these are fatal to the governor: sampling failures degrade to a
//! zero load contribution, refused core transitions are retried on the next
//! natural tick, and rejected config writes leave the prior value in place.

/// A per-core utilization query failed.
///
/// The sampler catches this and lets the core contribute 0% to the average
/// rather than failing the tick.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    /// The frequency-policy probe for the core failed (e.g. no cpufreq node).
    #[error("no frequency policy for core {core}")]
    NoFreqPolicy { core: u32 },

    /// Reading idle/wall time from the platform failed.
    #[error("idle/wall time query failed for core {core}: {source}")]
    StatsUnavailable {
        core: u32,
        #[source]
        source: std::io::Error,
    },
}

/// The platform refused a core online/offline request.
///
/// Treated as a no-op by the caller; the decision that produced it will
/// naturally recur on a later tick.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("bringing core {core} online failed: {source}")]
    OnlineFailed {
        core: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("bringing core {core} offline failed: {source}")]
    OfflineFailed {
        core: u32,
        #[source]
        source: std::io::Error,
    },

    /// The core id is outside the platform's known range.
    #[error("core {core} does not exist (nr_cpus = {nr_cpus})")]
    NoSuchCore { core: u32, nr_cpus: u32 },
}

/// A config write was rejected. The stored value is unchanged.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown parameter '{key}'")]
    UnknownKey { key: String },

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("value {value} for '{key}' outside valid range {min}..={max}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// The governor task is no longer running to serve the write.
    #[error("governor is not running")]
    GovernorStopped,
}
