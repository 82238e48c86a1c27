//! Deterministic in-memory CPU model.
//!
//! Backs the integration tests and the daemon's `--simulate` mode. Each
//! stats query advances the simulated clock by one quantum and accrues idle
//! time according to the per-core load set via `set_load`, so a sampler
//! always observes exactly the configured utilization. Fault injection
//! covers the two degrade paths: failing stats queries and refused
//! transitions.

use super::{CpuControl, CpuStats};
use crate::error::{SampleError, TransitionError};
use std::io;
use std::sync::Mutex;

/// Simulated clock quantum per stats query, in fake jiffies.
const QUANTUM: u64 = 100;

struct SimCore {
    online: bool,
    /// Utilization percent this core reports while online.
    load: u32,
    idle: u64,
    wall: u64,
    fail_stats: bool,
    refuse_transitions: bool,
}

pub struct SimCpu {
    cores: Mutex<Vec<SimCore>>,
}

impl SimCpu {
    /// `nr_cpus` cores, core 0 online, the rest offline, all at 0% load.
    pub fn new(nr_cpus: u32) -> Self {
        let cores = (0..nr_cpus.max(1))
            .map(|i| SimCore {
                online: i == 0,
                load: 0,
                idle: 0,
                wall: 0,
                fail_stats: false,
                refuse_transitions: false,
            })
            .collect();
        Self {
            cores: Mutex::new(cores),
        }
    }

    /// Set the utilization one core will report from now on.
    pub fn set_load(&self, core: u32, pct: u32) {
        let mut cores = self.cores.lock().unwrap();
        if let Some(c) = cores.get_mut(core as usize) {
            c.load = pct.min(100);
        }
    }

    /// Set the utilization every core will report from now on.
    pub fn set_all_load(&self, pct: u32) {
        let mut cores = self.cores.lock().unwrap();
        for c in cores.iter_mut() {
            c.load = pct.min(100);
        }
    }

    /// Make stats queries for one core fail (frequency-policy probe down).
    pub fn fail_stats(&self, core: u32, fail: bool) {
        let mut cores = self.cores.lock().unwrap();
        if let Some(c) = cores.get_mut(core as usize) {
            c.fail_stats = fail;
        }
    }

    /// Make online/offline requests for one core be refused.
    pub fn refuse_transitions(&self, core: u32, refuse: bool) {
        let mut cores = self.cores.lock().unwrap();
        if let Some(c) = cores.get_mut(core as usize) {
            c.refuse_transitions = refuse;
        }
    }

    /// Online core ids, ascending. Test helper.
    pub fn online_cores(&self) -> Vec<u32> {
        let cores = self.cores.lock().unwrap();
        cores
            .iter()
            .enumerate()
            .filter(|(_, c)| c.online)
            .map(|(i, _)| i as u32)
            .collect()
    }
}

impl CpuControl for SimCpu {
    fn nr_cpus(&self) -> u32 {
        self.cores.lock().unwrap().len() as u32
    }

    fn bring_online(&self, core: u32) -> Result<(), TransitionError> {
        let mut cores = self.cores.lock().unwrap();
        let nr_cpus = cores.len() as u32;
        let c = cores
            .get_mut(core as usize)
            .ok_or(TransitionError::NoSuchCore { core, nr_cpus })?;
        if c.refuse_transitions {
            return Err(TransitionError::OnlineFailed {
                core,
                source: io::Error::new(io::ErrorKind::Other, "simulated refusal"),
            });
        }
        c.online = true;
        Ok(())
    }

    fn bring_offline(&self, core: u32) -> Result<(), TransitionError> {
        let mut cores = self.cores.lock().unwrap();
        let nr_cpus = cores.len() as u32;
        let c = cores
            .get_mut(core as usize)
            .ok_or(TransitionError::NoSuchCore { core, nr_cpus })?;
        if core == 0 || c.refuse_transitions {
            return Err(TransitionError::OfflineFailed {
                core,
                source: io::Error::new(io::ErrorKind::PermissionDenied, "simulated refusal"),
            });
        }
        c.online = false;
        Ok(())
    }

    fn is_online(&self, core: u32) -> bool {
        self.cores
            .lock()
            .unwrap()
            .get(core as usize)
            .is_some_and(|c| c.online)
    }
}

impl CpuStats for SimCpu {
    fn idle_and_wall_time(&self, core: u32) -> Result<(u64, u64), SampleError> {
        let mut cores = self.cores.lock().unwrap();
        let c = cores
            .get_mut(core as usize)
            .ok_or(SampleError::NoFreqPolicy { core })?;
        if c.fail_stats {
            return Err(SampleError::NoFreqPolicy { core });
        }
        c.wall += QUANTUM;
        c.idle += QUANTUM * u64::from(100 - c.load) / 100;
        Ok((c.idle, c.wall))
    }
}
