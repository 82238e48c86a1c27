//! External event types consumed by the governor.
//!
//! The platform's display and input notifiers are modeled as explicit edge
//! events that adapters push into the governor via `GovernorHandle`; the
//! governor never registers callbacks itself.

use serde::{Deserialize, Serialize};

/// Display power edge event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayEvent {
    /// Display powered on — resume normal operation.
    On,
    /// Display powered off — drop to the core floor and stop ticking.
    Off,
}

/// Kind of input event as reported by the input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Touch,
    Key,
    Other,
}

/// A raw input event. Only the touch-down predicate matters to the governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: InputKind,
    /// True on press / contact-down, false on release.
    pub pressed: bool,
}

impl InputEvent {
    /// A finger-down touch event.
    pub fn touch_down() -> Self {
        Self {
            kind: InputKind::Touch,
            pressed: true,
        }
    }

    /// Whether this event qualifies for touch boost.
    pub fn is_touch_down(&self) -> bool {
        self.kind == InputKind::Touch && self.pressed
    }
}
