//! coreplugd — runs the core activation governor as a daemon.
//!
//! By default it drives the real Linux hotplug surface (root required);
//! `--simulate` runs the same governor against an in-memory 6-core model
//! with a synthetic load wave, useful for watching policy behavior without
//! touching the machine. SIGUSR1/SIGUSR2 inject display-off/display-on
//! edges for manual exercise of the suspend path.

use anyhow::Result;
use clap::Parser;
use coreplug::{
    start_governor, CpuControl, CpuStats, DisplayEvent, GovernorConfig, GovernorHandle, SimCpu,
    SysfsCpu,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "coreplugd", about = "Dynamic CPU-core activation governor")]
struct Cli {
    /// Tick period in milliseconds.
    #[arg(long)]
    sample_rate: Option<u64>,

    /// Ceiling on active cores.
    #[arg(long)]
    max_cpus: Option<u32>,

    /// Floor on active cores.
    #[arg(long)]
    min_cpus: Option<u32>,

    /// Decision policy: threshold_hysteresis or predictive_histogram.
    #[arg(long)]
    policy: Option<String>,

    /// Fixed target load for the hysteresis policy (0-100).
    #[arg(long)]
    target_load: Option<u32>,

    /// Disable the touch boost override.
    #[arg(long)]
    no_touch_boost: bool,

    /// Run against a simulated 6-core machine instead of the real sysfs
    /// surface.
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.simulate {
        let platform = Arc::new(SimCpu::new(6));
        spawn_load_wave(platform.clone());
        run(platform, &cli).await
    } else {
        let platform = Arc::new(SysfsCpu::discover());
        if platform.nr_cpus() < 2 {
            warn!("single-core topology detected; nothing to govern");
        }
        run(platform, &cli).await
    }
}

async fn run<P>(platform: Arc<P>, cli: &Cli) -> Result<()>
where
    P: CpuControl + CpuStats + 'static,
{
    let mut config = GovernorConfig::for_topology(platform.nr_cpus());
    apply_overrides(&mut config, cli)?;

    let governor = start_governor(platform, config);
    spawn_status_logger(&governor);

    info!("coreplugd running; ctrl-c to stop");
    wait_for_signals(&governor).await;

    governor.shutdown().await;
    info!("coreplugd exited");
    Ok(())
}

/// Route CLI overrides through the validated config surface so bad flags
/// fail the same way bad runtime writes do.
fn apply_overrides(config: &mut GovernorConfig, cli: &Cli) -> Result<()> {
    let mut writes: Vec<(&str, String)> = Vec::new();
    if let Some(v) = cli.sample_rate {
        writes.push(("sample_rate", v.to_string()));
    }
    if let Some(v) = cli.max_cpus {
        writes.push(("max_cpus", v.to_string()));
    }
    if let Some(v) = cli.min_cpus {
        writes.push(("min_cpus", v.to_string()));
    }
    if let Some(ref v) = cli.policy {
        writes.push(("policy", v.clone()));
    }
    if let Some(v) = cli.target_load {
        writes.push(("target_load", v.to_string()));
    }
    if cli.no_touch_boost {
        writes.push(("touch_boost_enabled", "0".to_string()));
    }
    for (key, value) in writes {
        config.set_text(key, &value)?;
    }
    Ok(())
}

/// Log every status change as a single JSON line.
fn spawn_status_logger(governor: &GovernorHandle) {
    let mut rx = governor.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow().clone();
            match serde_json::to_string(&status) {
                Ok(line) => info!(target: "coreplugd::status", "{}", line),
                Err(e) => warn!("status serialization failed: {}", e),
            }
        }
    });
}

/// Triangle load wave for `--simulate`: ramps 0 -> 100 -> 0 in 10% steps.
fn spawn_load_wave(sim: Arc<SimCpu>) {
    tokio::spawn(async move {
        let mut load: i32 = 0;
        let mut step: i32 = 10;
        loop {
            sim.set_all_load(load as u32);
            tokio::time::sleep(Duration::from_millis(1500)).await;
            if load >= 100 || (load <= 0 && step < 0) {
                step = -step;
            }
            load = (load + step).clamp(0, 100);
        }
    });
}

#[cfg(unix)]
async fn wait_for_signals(governor: &GovernorHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            warn!("SIGUSR1 handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    let mut usr2 = match signal(SignalKind::user_defined2()) {
        Ok(s) => s,
        Err(e) => {
            warn!("SIGUSR2 handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = usr1.recv() => {
                info!("SIGUSR1: display off");
                governor.on_display_event(DisplayEvent::Off).await;
            }
            _ = usr2.recv() => {
                info!("SIGUSR2: display on");
                governor.on_display_event(DisplayEvent::On).await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_governor: &GovernorHandle) {
    let _ = tokio::signal::ctrl_c().await;
}
