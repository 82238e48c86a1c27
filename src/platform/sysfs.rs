//! Linux hotplug and `/proc/stat` adapter.
//!
//! Core control goes through `/sys/devices/system/cpu/cpuN/online`; cpu0
//! carries no `online` node on most kernels and is treated as permanently
//! online. Utilization comes from the per-core `/proc/stat` line with
//! idle = idle + iowait and wall = the sum of all fields. The cpufreq
//! directory stands in for the frequency-policy probe: a core without one
//! fails the sample and contributes zero load upstream.

use super::{CpuControl, CpuStats};
use crate::error::{SampleError, TransitionError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_CPU_ROOT: &str = "/sys/devices/system/cpu";
const DEFAULT_PROC_STAT: &str = "/proc/stat";

pub struct SysfsCpu {
    cpu_root: PathBuf,
    proc_stat: PathBuf,
    nr_cpus: u32,
}

impl SysfsCpu {
    /// Probe the standard sysfs/procfs locations.
    pub fn discover() -> Self {
        Self::at(DEFAULT_CPU_ROOT, DEFAULT_PROC_STAT)
    }

    /// Probe against explicit roots (used by tests with a fake tree).
    pub fn at(cpu_root: impl Into<PathBuf>, proc_stat: impl Into<PathBuf>) -> Self {
        let cpu_root = cpu_root.into();
        let nr_cpus = count_cpu_dirs(&cpu_root).max(1);
        debug!("sysfs topology: {} cores under {}", nr_cpus, cpu_root.display());
        Self {
            cpu_root,
            proc_stat: proc_stat.into(),
            nr_cpus,
        }
    }

    fn online_node(&self, core: u32) -> PathBuf {
        self.cpu_root.join(format!("cpu{core}/online"))
    }

    fn check_core(&self, core: u32) -> Result<(), TransitionError> {
        if core >= self.nr_cpus {
            return Err(TransitionError::NoSuchCore {
                core,
                nr_cpus: self.nr_cpus,
            });
        }
        Ok(())
    }
}

impl CpuControl for SysfsCpu {
    fn nr_cpus(&self) -> u32 {
        self.nr_cpus
    }

    fn bring_online(&self, core: u32) -> Result<(), TransitionError> {
        self.check_core(core)?;
        if core == 0 {
            return Ok(()); // cpu0 is always online
        }
        fs::write(self.online_node(core), "1")
            .map_err(|source| TransitionError::OnlineFailed { core, source })
    }

    fn bring_offline(&self, core: u32) -> Result<(), TransitionError> {
        self.check_core(core)?;
        if core == 0 {
            return Err(TransitionError::OfflineFailed {
                core,
                source: io::Error::new(io::ErrorKind::PermissionDenied, "cpu0 is not hotpluggable"),
            });
        }
        fs::write(self.online_node(core), "0")
            .map_err(|source| TransitionError::OfflineFailed { core, source })
    }

    fn is_online(&self, core: u32) -> bool {
        if core >= self.nr_cpus {
            return false;
        }
        match fs::read_to_string(self.online_node(core)) {
            Ok(s) => s.trim() == "1",
            // No online node means the kernel does not allow offlining the
            // core (cpu0), so it is online.
            Err(_) => core == 0,
        }
    }
}

impl CpuStats for SysfsCpu {
    fn idle_and_wall_time(&self, core: u32) -> Result<(u64, u64), SampleError> {
        if !self.cpu_root.join(format!("cpu{core}/cpufreq")).is_dir() {
            return Err(SampleError::NoFreqPolicy { core });
        }
        let stat = fs::read_to_string(&self.proc_stat)
            .map_err(|source| SampleError::StatsUnavailable { core, source })?;
        parse_core_times(&stat, core).ok_or_else(|| SampleError::StatsUnavailable {
            core,
            source: io::Error::new(io::ErrorKind::NotFound, "no per-core line in /proc/stat"),
        })
    }
}

fn count_cpu_dirs(root: &Path) -> u32 {
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.strip_prefix("cpu")
                .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        })
        .count() as u32
}

/// Extract (idle, wall) jiffies for one core from `/proc/stat` content.
fn parse_core_times(stat: &str, core: u32) -> Option<(u64, u64)> {
    let prefix = format!("cpu{core} ");
    let line = stat.lines().find(|l| l.starts_with(&prefix))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    // user nice system idle iowait irq softirq steal [guest guest_nice]
    if fields.len() < 5 {
        return None;
    }
    let idle = fields[3] + fields[4];
    let wall = fields.iter().sum();
    Some((idle, wall))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "\
cpu  100 0 100 800 50 0 0 0 0 0
cpu0 60 0 60 400 25 5 0 0 0 0
cpu1 40 0 40 400 25 0 0 0 0 0
intr 12345
ctxt 6789
";

    #[test]
    fn test_parse_core_times() {
        let (idle, wall) = parse_core_times(STAT, 0).unwrap();
        assert_eq!(idle, 400 + 25);
        assert_eq!(wall, 60 + 60 + 400 + 25 + 5);

        let (idle, wall) = parse_core_times(STAT, 1).unwrap();
        assert_eq!(idle, 425);
        assert_eq!(wall, 505);
    }

    #[test]
    fn test_parse_missing_core() {
        assert_eq!(parse_core_times(STAT, 7), None);
    }

    #[test]
    fn test_parse_does_not_match_aggregate_line() {
        // "cpu " must not be mistaken for "cpu0 "
        let only_aggregate = "cpu  1 2 3 4 5 6 7 8\n";
        assert_eq!(parse_core_times(only_aggregate, 0), None);
    }

    #[test]
    fn test_parse_short_line_rejected() {
        assert_eq!(parse_core_times("cpu0 1 2 3\n", 0), None);
    }

    #[test]
    fn test_count_cpu_dirs_missing_root() {
        assert_eq!(count_cpu_dirs(Path::new("/nonexistent/cpu/root")), 0);
    }
}
