//! Events broadcast by the daemon
//!
//! Subscribed IPC clients (the tray app) receive these to refresh the mute
//! icon and the displayed shortcut.

use serde::{Deserialize, Serialize};

/// Events emitted by the engine and the mute worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The shortcut fired and the microphone was toggled
    MuteToggled {
        /// Mute state after the toggle
        muted: bool,
    },

    /// A capture session attached to the keyboard
    CaptureStarted,

    /// A capture session recorded a new chord (not yet saved)
    CaptureCommitted {
        keys: Vec<String>,
    },

    /// A capture session ended with nothing held for the fail delay
    CaptureTimedOut {
        fail_delay_ms: u64,
    },

    /// A new shortcut was persisted and is now active
    ShortcutSaved {
        keys: Vec<String>,
    },
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::MuteToggled { muted } => {
                write!(f, "MUTE_TOGGLED ({})", if *muted { "muted" } else { "live" })
            }
            EngineEvent::CaptureStarted => write!(f, "CAPTURE_STARTED"),
            EngineEvent::CaptureCommitted { keys } => {
                write!(f, "CAPTURE_COMMITTED ({})", keys.join(" + "))
            }
            EngineEvent::CaptureTimedOut { fail_delay_ms } => {
                write!(f, "CAPTURE_TIMED_OUT ({}ms)", fail_delay_ms)
            }
            EngineEvent::ShortcutSaved { keys } => {
                write!(f, "SHORTCUT_SAVED ({})", keys.join(" + "))
            }
        }
    }
}
