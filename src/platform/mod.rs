//! External collaborator surfaces.
//!
//! The governor never touches the OS directly; it goes through these two
//! traits. `SysfsCpu` implements them against the Linux hotplug and
//! `/proc/stat` interfaces, `SimCpu` against a deterministic in-memory model
//! used by tests and the daemon's `--simulate` mode.

mod sim;
mod sysfs;

pub use sim::SimCpu;
pub use sysfs::SysfsCpu;

use crate::error::{SampleError, TransitionError};

/// Core online/offline control surface.
pub trait CpuControl: Send + Sync {
    /// Number of hardware cores the platform knows about.
    fn nr_cpus(&self) -> u32;

    fn bring_online(&self, core: u32) -> Result<(), TransitionError>;

    fn bring_offline(&self, core: u32) -> Result<(), TransitionError>;

    fn is_online(&self, core: u32) -> bool;

    /// Count of currently online cores.
    fn online_count(&self) -> u32 {
        (0..self.nr_cpus()).filter(|&c| self.is_online(c)).count() as u32
    }
}

/// Per-core utilization query surface.
pub trait CpuStats: Send + Sync {
    /// Cumulative (idle_time, wall_time) for a core, in platform units
    /// (jiffies on Linux). Monotonically increasing while the core runs.
    fn idle_and_wall_time(&self, core: u32) -> Result<(u64, u64), SampleError>;
}
