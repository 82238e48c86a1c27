//! Load sampling and aggregation.
//!
//! One `CoreSample` per hardware core holds the previous idle/wall readings;
//! each tick computes the delta-based utilization and folds the online cores
//! into a single mean percentage. Failures degrade to a 0% contribution
//! rather than failing the tick.

use crate::error::SampleError;
use crate::platform::{CpuControl, CpuStats};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
struct CoreSample {
    prev_idle: u64,
    prev_wall: u64,
    last_load: u32,
}

pub struct LoadSampler {
    samples: Vec<CoreSample>,
}

impl LoadSampler {
    pub fn new(nr_cpus: u32) -> Self {
        Self {
            samples: vec![CoreSample::default(); nr_cpus.max(1) as usize],
        }
    }

    /// Utilization of one core since its previous sample, 0–100.
    ///
    /// A zero wall delta or an idle delta exceeding the wall delta (clock
    /// anomaly after hotplug) yields 0 rather than an error, as does a core
    /// id beyond the sampler's arena; only a failed platform query is
    /// surfaced, and the caller degrades that to 0 too.
    pub fn sample_core(&mut self, core: u32, stats: &dyn CpuStats) -> Result<u32, SampleError> {
        if core as usize >= self.samples.len() {
            return Ok(0);
        }
        let (idle_now, wall_now) = stats.idle_and_wall_time(core)?;
        let slot = &mut self.samples[core as usize];

        let wall_delta = wall_now.wrapping_sub(slot.prev_wall);
        let idle_delta = idle_now.wrapping_sub(slot.prev_idle);
        slot.prev_wall = wall_now;
        slot.prev_idle = idle_now;

        if wall_delta == 0 || wall_delta < idle_delta {
            slot.last_load = 0;
            return Ok(0);
        }

        let load = (100 * (wall_delta - idle_delta) / wall_delta) as u32;
        slot.last_load = load;
        Ok(load)
    }

    /// Mean utilization across currently-online cores, integer division.
    ///
    /// Cores whose query fails contribute 0 to the sum but still count
    /// toward the divisor, matching the degrade-not-fail policy.
    pub fn sample_average(&mut self, control: &dyn CpuControl, stats: &dyn CpuStats) -> u32 {
        let mut sum = 0u32;
        let mut online = 0u32;
        for core in 0..control.nr_cpus().min(self.samples.len() as u32) {
            if !control.is_online(core) {
                continue;
            }
            online += 1;
            match self.sample_core(core, stats) {
                Ok(load) => sum += load,
                Err(e) => debug!("core {} sample degraded to 0: {}", core, e),
            }
        }
        if online == 0 {
            return 0;
        }
        sum / online
    }

    /// Last computed per-core loads, indexed by core id.
    pub fn last_loads(&self) -> Vec<u32> {
        self.samples.iter().map(|s| s.last_load).collect()
    }
}
