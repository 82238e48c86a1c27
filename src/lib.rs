//! coreplug — a dynamic CPU-core activation governor.
//!
//! Periodic utilization samples drive a policy (fixed-target hysteresis or
//! histogram-based prediction) that brings cores online and offline along a
//! fixed priority order, bounded by configurable min/max active-core limits.
//! Display-off suspends the governor down to the core floor; display-on and
//! touch input force bulk reactivation that bypasses the hysteresis.
//!
//! ```no_run
//! use coreplug::{start_governor, GovernorConfig, SysfsCpu};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let platform = Arc::new(SysfsCpu::discover());
//! let config = GovernorConfig::for_topology(6);
//! let governor = start_governor(platform, config);
//! let status = governor.status();
//! println!("{} cores online", status.online_cpus);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod governor;
pub mod platform;
pub mod policy;
pub mod sampler;
pub mod sequencer;

pub use config::{GovernorConfig, PolicyKind, ScalingBias};
pub use error::{ConfigError, SampleError, TransitionError};
pub use events::{DisplayEvent, InputEvent, InputKind};
pub use governor::{start_governor, GovernorHandle, GovernorState, GovernorStatus};
pub use platform::{CpuControl, CpuStats, SimCpu, SysfsCpu};
pub use policy::Decision;
pub use sequencer::DEFAULT_ACTIVATION_ORDER;
