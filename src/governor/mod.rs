//! The governor actor and its public handle.
//!
//! All mutable governor state (sampler history, policy counters, activation
//! index, suspend flag, config) lives inside one task; the periodic tick,
//! display events, touch boost, the delayed resume and config writes are all
//! commands consumed by that single task, so no two of them ever interleave.

mod engine;

use crate::config::{GovernorConfig, PolicyKind};
use crate::error::ConfigError;
use crate::events::{DisplayEvent, InputEvent};
use crate::platform::{CpuControl, CpuStats};
use crate::policy::Decision;
use engine::{Command, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Published governor state. `Up`/`Down` are transient within a tick; the
/// steady published state is `Idle` (or `Disabled`/suspended).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernorState {
    Disabled,
    Idle,
    Down,
    Up,
}

/// Snapshot broadcast after every command the governor acts on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorStatus {
    pub state: GovernorState,
    pub suspended: bool,
    pub policy: PolicyKind,
    /// Aggregated load from the most recent tick.
    pub avg_load: u32,
    /// Target load in effect on the most recent tick (the histogram's
    /// prediction under the predictive policy).
    pub effective_target_load: u32,
    pub online_cpus: u32,
    pub activation_index: usize,
    /// Decision emitted by the most recent tick.
    pub last_decision: Decision,
    /// Last computed per-core loads, indexed by core id.
    pub per_core_load: Vec<u32>,
}

/// Handle to a running governor.
///
/// Cheap to clone via `subscribe()` for status; command methods are async
/// because they queue onto the actor's channel.
pub struct GovernorHandle {
    cmd_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<GovernorStatus>,
    task: JoinHandle<()>,
}

impl GovernorHandle {
    /// Current status snapshot.
    pub fn status(&self) -> GovernorStatus {
        self.status_rx.borrow().clone()
    }

    /// A receiver for status updates; `.changed().await` to follow them.
    pub fn subscribe(&self) -> watch::Receiver<GovernorStatus> {
        self.status_rx.clone()
    }

    /// Push a display power edge event (the display adapter calls this).
    pub async fn on_display_event(&self, event: DisplayEvent) {
        let _ = self.cmd_tx.send(Command::Display(event)).await;
    }

    /// Push an input event (the input adapter calls this). Only qualifying
    /// touch-down events have any effect.
    pub async fn on_touch_event(&self, event: InputEvent) {
        if !event.is_touch_down() {
            debug!("ignoring non-touch-down input event");
            return;
        }
        let _ = self.cmd_tx.send(Command::TouchBoost).await;
    }

    /// Validated textual config write (see `GovernorConfig::KEYS`).
    pub async fn set_param(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetParam {
                key: key.to_string(),
                value: value.to_string(),
                reply,
            })
            .await
            .map_err(|_| ConfigError::GovernorStopped)?;
        rx.await.map_err(|_| ConfigError::GovernorStopped)?
    }

    /// Read a parameter as text. `None` for unknown keys or a stopped
    /// governor.
    pub async fn get_param(&self, key: &str) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::GetParam {
                key: key.to_string(),
                reply,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Enable or disable the governor. Disabling cancels the pending tick;
    /// both directions are idempotent.
    pub async fn set_enabled(&self, enabled: bool) {
        let _ = self.cmd_tx.send(Command::SetEnabled(enabled)).await;
    }

    /// Stop the governor and wait for the actor task to exit.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Start the governor over a platform, with the first tick armed shortly
/// after return.
pub fn start_governor<P>(platform: Arc<P>, config: GovernorConfig) -> GovernorHandle
where
    P: CpuControl + CpuStats + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let initial = GovernorStatus {
        state: GovernorState::Idle,
        suspended: false,
        policy: config.policy,
        avg_load: 0,
        effective_target_load: config.target_load,
        online_cpus: platform.online_count(),
        activation_index: 0,
        last_decision: Decision::Idle,
        per_core_load: vec![0; platform.nr_cpus() as usize],
    };
    let (status_tx, status_rx) = watch::channel(initial);

    let engine = Engine::new(platform, config, cmd_rx, cmd_tx.clone(), status_tx);
    let task = tokio::spawn(engine.run());

    GovernorHandle {
        cmd_tx,
        status_rx,
        task,
    }
}
