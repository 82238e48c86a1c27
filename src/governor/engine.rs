//! The single-writer governor engine.
//!
//! One `tokio::select!` loop over the command channel and an optional armed
//! tick deadline. A single `Option<Instant>` holds the next tick, so
//! re-arming can never double-schedule; suspend and disable cancel it by
//! clearing the option. The delayed resume runs as a detached sleep that
//! feeds a `Resume` command back through the same channel, which keeps it
//! serialized with everything else.

use super::{GovernorState, GovernorStatus};
use crate::config::GovernorConfig;
use crate::error::ConfigError;
use crate::events::DisplayEvent;
use crate::platform::{CpuControl, CpuStats};
use crate::policy::{Decision, PolicyState};
use crate::sampler::LoadSampler;
use crate::sequencer::{ActivationSequencer, StepOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Delay before the first tick after start or re-enable.
const STARTUP_DELAY: Duration = Duration::from_millis(10);
/// Delay between a display-on edge and the bulk online-all resume.
const RESUME_DELAY: Duration = Duration::from_millis(10);

pub(super) enum Command {
    Display(DisplayEvent),
    TouchBoost,
    /// Internal: delayed follow-up to `Display(On)`.
    Resume,
    SetParam {
        key: String,
        value: String,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    GetParam {
        key: String,
        reply: oneshot::Sender<Option<String>>,
    },
    SetEnabled(bool),
    Shutdown,
}

pub(super) struct Engine<P> {
    platform: Arc<P>,
    cfg: GovernorConfig,
    sampler: LoadSampler,
    policy: PolicyState,
    sequencer: ActivationSequencer,
    suspended: bool,
    enabled: bool,
    /// Armed deadline of the next tick, if any.
    next_tick: Option<Instant>,
    rx: mpsc::Receiver<Command>,
    /// Kept so the delayed resume task can queue into the same channel.
    cmd_tx: mpsc::Sender<Command>,
    status_tx: watch::Sender<GovernorStatus>,
    last_avg: u32,
    last_target: u32,
    last_decision: Decision,
}

impl<P> Engine<P>
where
    P: CpuControl + CpuStats + 'static,
{
    pub(super) fn new(
        platform: Arc<P>,
        cfg: GovernorConfig,
        rx: mpsc::Receiver<Command>,
        cmd_tx: mpsc::Sender<Command>,
        status_tx: watch::Sender<GovernorStatus>,
    ) -> Self {
        let nr_cpus = platform.nr_cpus();
        let last_target = cfg.target_load;
        Self {
            platform,
            cfg,
            sampler: LoadSampler::new(nr_cpus),
            policy: PolicyState::new(),
            sequencer: ActivationSequencer::for_topology(nr_cpus),
            suspended: false,
            enabled: true,
            next_tick: None,
            rx,
            cmd_tx,
            status_tx,
            last_avg: 0,
            last_target,
            last_decision: Decision::Idle,
        }
    }

    pub(super) async fn run(mut self) {
        info!(
            "governor started: {} cores, sample rate {} ms, bounds [{}, {}]",
            self.platform.nr_cpus(),
            self.cfg.sample_rate_ms,
            self.cfg.min_cpus,
            self.cfg.max_cpus
        );
        self.next_tick = Some(Instant::now() + STARTUP_DELAY);

        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    None | Some(Command::Shutdown) => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                _ = wait_until(self.next_tick) => {
                    self.next_tick = None;
                    self.tick();
                }
            }
        }
        info!("governor stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Display(DisplayEvent::Off) => self.suspend(),
            Command::Display(DisplayEvent::On) => self.schedule_resume(),
            Command::Resume => self.resume(),
            Command::TouchBoost => self.touch_boost(),
            Command::SetParam { key, value, reply } => {
                let _ = reply.send(self.set_param(&key, &value));
            }
            Command::GetParam { key, reply } => {
                let _ = reply.send(self.cfg.get_text(&key));
            }
            Command::SetEnabled(enabled) => self.set_enabled(enabled),
            Command::Shutdown => unreachable!("handled in run()"),
        }
    }

    /// One sample-decide-act cycle.
    fn tick(&mut self) {
        if !self.enabled || self.suspended {
            // Neither state re-arms; a tick that raced a suspend or disable
            // command does nothing.
            return;
        }

        let avg = self
            .sampler
            .sample_average(self.platform.as_ref(), self.platform.as_ref());
        let (decision, target) = self.policy.evaluate(avg, &self.cfg);

        match decision {
            Decision::Up => match self
                .sequencer
                .step_up(self.cfg.max_cpus, self.platform.as_ref())
            {
                Ok(StepOutcome::Onlined(core)) => {
                    info!("core {} online (avg load {}, target {})", core, avg, target);
                }
                Ok(StepOutcome::CorrectiveOffline(core)) => {
                    warn!(
                        "core {} offlined to honor max_cpus {} on an up decision",
                        core, self.cfg.max_cpus
                    );
                }
                Ok(StepOutcome::AtCeiling) => {
                    debug!("up decision with all {} positions active", self.sequencer.len());
                }
                Ok(_) => {}
                Err(e) => warn!("up transition refused, retrying next tick: {}", e),
            },
            Decision::Down => match self
                .sequencer
                .step_down(self.cfg.min_cpus, self.platform.as_ref())
            {
                Ok(StepOutcome::Offlined(core)) => {
                    info!("core {} offline (avg load {}, target {})", core, avg, target);
                }
                Ok(StepOutcome::AtFloor) => {
                    debug!("down decision held at min_cpus {}", self.cfg.min_cpus);
                }
                Ok(_) => {}
                Err(e) => warn!("down transition refused, retrying next tick: {}", e),
            },
            Decision::Idle | Decision::Disabled => {}
        }

        self.last_avg = avg;
        self.last_target = target;
        self.last_decision = decision;
        self.publish(match decision {
            Decision::Up => GovernorState::Up,
            Decision::Down => GovernorState::Down,
            Decision::Idle | Decision::Disabled => GovernorState::Idle,
        });
        self.rearm();
    }

    fn rearm(&mut self) {
        self.next_tick = Some(Instant::now() + Duration::from_millis(self.cfg.sample_rate_ms));
    }

    /// Display off: drop to the core floor and halt ticking.
    fn suspend(&mut self) {
        self.suspended = true;
        self.next_tick = None;
        let min = self.cfg.min_cpus as usize;
        for pos in (min..self.sequencer.len()).rev() {
            let core = self.sequencer.core_at(pos);
            if self.platform.is_online(core) {
                if let Err(e) = self.platform.bring_offline(core) {
                    warn!("suspend could not offline core {}: {}", core, e);
                }
            }
        }
        self.sequencer.set_index(min.saturating_sub(1));
        info!(
            "suspended: {} cores online",
            self.platform.online_count()
        );
        self.publish(GovernorState::Idle);
    }

    /// Display on: clear the flag now, do the bulk online shortly after.
    fn schedule_resume(&mut self) {
        self.suspended = false;
        let tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            time::sleep(RESUME_DELAY).await;
            let _ = tx.send(Command::Resume).await;
        });
        debug!("resume scheduled in {:?}", RESUME_DELAY);
    }

    fn resume(&mut self) {
        if self.suspended {
            // The display went off again before the delayed resume ran.
            debug!("dropping stale resume");
            return;
        }
        let max = (self.cfg.max_cpus as usize).min(self.sequencer.len());
        for pos in 0..max {
            let core = self.sequencer.core_at(pos);
            if !self.platform.is_online(core) {
                if let Err(e) = self.platform.bring_online(core) {
                    warn!("resume could not online core {}: {}", core, e);
                }
            }
        }
        self.sequencer.set_index(max.saturating_sub(1));
        info!("resumed: {} cores online", self.platform.online_count());
        if self.enabled {
            self.rearm();
        }
        self.publish(GovernorState::Idle);
    }

    /// Force every governable core online, bypassing policy and sequencer.
    ///
    /// Neither the activation index nor the hysteresis counter changes, so
    /// the next tick can immediately contradict the boost. That is the
    /// intended behavior, not a bug. The boost also fires while suspended;
    /// ticking stays halted, so the cores remain up until the next display
    /// edge. Only `touch_boost_enabled` and a disabled governor gate it.
    fn touch_boost(&mut self) {
        if !self.cfg.touch_boost_enabled {
            debug!("touch boost disabled, ignoring");
            return;
        }
        if !self.enabled {
            debug!("touch boost ignored while disabled");
            return;
        }
        let max = (self.cfg.max_cpus as usize).min(self.sequencer.len());
        for pos in 0..max {
            let core = self.sequencer.core_at(pos);
            if !self.platform.is_online(core) {
                if let Err(e) = self.platform.bring_online(core) {
                    warn!("boost could not online core {}: {}", core, e);
                }
            }
        }
        info!("touch boost: {} cores online", self.platform.online_count());
        self.publish(GovernorState::Idle);
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            info!("governor enabled");
            self.next_tick = Some(Instant::now() + STARTUP_DELAY);
            self.publish(GovernorState::Idle);
        } else {
            info!("governor disabled");
            self.next_tick = None;
            self.last_decision = Decision::Disabled;
            self.publish(GovernorState::Disabled);
        }
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.cfg.set_text(key, value)?;
        info!("config '{}' set to '{}'", key, value);
        // Core-bound writes have a structural side effect; everything else
        // simply takes effect on the next tick or event.
        if matches!(key, "max_cpus" | "min_cpus") {
            self.reconcile_bounds();
        }
        self.publish(if self.enabled {
            GovernorState::Idle
        } else {
            GovernorState::Disabled
        });
        Ok(())
    }

    /// Re-establish the core-count and index invariants after a bounds
    /// change: [min_cpus, max_cpus] active, index inside
    /// [min_cpus-1, max_cpus-1].
    fn reconcile_bounds(&mut self) {
        let min = self.cfg.min_cpus as usize;
        let max = (self.cfg.max_cpus as usize).min(self.sequencer.len());
        // During suspend the floor, not the ceiling, is the operating level.
        let level = if self.suspended { min } else { max };

        for pos in (level..self.sequencer.len()).rev() {
            let core = self.sequencer.core_at(pos);
            if self.platform.is_online(core) {
                if let Err(e) = self.platform.bring_offline(core) {
                    warn!("bounds change could not offline core {}: {}", core, e);
                }
            }
        }
        for pos in 0..min {
            let core = self.sequencer.core_at(pos);
            if !self.platform.is_online(core) {
                if let Err(e) = self.platform.bring_online(core) {
                    warn!("bounds change could not online core {}: {}", core, e);
                }
            }
        }
        self.sequencer
            .clamp_index(self.cfg.min_cpus, self.cfg.max_cpus);
        debug!(
            "bounds reconciled: {} online, index {}",
            self.platform.online_count(),
            self.sequencer.index()
        );
    }

    fn publish(&self, state: GovernorState) {
        let _ = self.status_tx.send(GovernorStatus {
            state,
            suspended: self.suspended,
            policy: self.cfg.policy,
            avg_load: self.last_avg,
            effective_target_load: self.last_target,
            online_cpus: self.platform.online_count(),
            activation_index: self.sequencer.index(),
            last_decision: self.last_decision,
            per_core_load: self.sampler.last_loads(),
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
