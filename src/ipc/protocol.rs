//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::engine::{CaptureConfig, CaptureError, EngineStatus};
use crate::shortcut::Shortcut;

/// Requests from the tray app to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Record a new shortcut from the keyboard.
    ///
    /// Omitted timings fall back to the daemon's configured defaults.
    CaptureShortcut {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_after_key_down_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fail_delay_ms: Option<u64>,
    },

    /// Persist a shortcut the user confirmed and start using it
    SaveShortcut { keys: Vec<String> },

    /// Ping to check connectivity
    Ping,

    /// Switch this connection to event notifications
    Subscribe,
}

impl Request {
    /// Capture timings for a `CaptureShortcut` request, filled from `defaults`
    pub fn capture_config(
        finish_after_key_down_ms: Option<u64>,
        fail_delay_ms: Option<u64>,
        defaults: CaptureConfig,
    ) -> CaptureConfig {
        CaptureConfig {
            finish_after_key_down: finish_after_key_down_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or(defaults.finish_after_key_down),
            fail_delay: fail_delay_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or(defaults.fail_delay),
        }
    }
}

/// Responses from daemon to the tray app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// A capture session recorded a shortcut; it is not saved yet
    Captured { keys: Vec<String>, display: String },

    /// A capture session saw no keys for the configured delay
    CaptureTimedOut { fail_delay_ms: u64 },

    /// The shortcut was persisted and is now active
    ShortcutSaved { keys: Vec<String>, display: String },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Map the outcome of a capture session
    pub fn from_capture(result: Result<Shortcut, CaptureError>) -> Self {
        match result {
            Ok(shortcut) => Response::Captured {
                display: shortcut.to_display_string(),
                keys: shortcut.keys().to_vec(),
            },
            Err(CaptureError::TimedOut { delay }) => Response::CaptureTimedOut {
                fail_delay_ms: delay.as_millis() as u64,
            },
            Err(e @ CaptureError::InProgress) => Response::error("capture_in_progress", e.to_string()),
            Err(e) => Response::error("capture_failed", e.to_string()),
        }
    }

    pub fn saved(shortcut: &Shortcut) -> Self {
        Response::ShortcutSaved {
            keys: shortcut.keys().to_vec(),
            display: shortcut.to_display_string(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Active shortcut keys in display order
    pub shortcut: Vec<String>,

    /// Active shortcut as shown in the tray menu
    pub display: String,

    /// A capture session is running
    pub capturing: bool,

    /// Whether the trigger matcher is receiving key events
    pub hotkey_registered: bool,

    /// Microphone mute state; `None` when the platform cannot report it
    pub muted: Option<bool>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl DaemonStatus {
    pub fn from_engine(
        status: &EngineStatus,
        hotkey_registered: bool,
        muted: Option<bool>,
        uptime_secs: u64,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            shortcut: status.shortcut.keys().to_vec(),
            display: status.shortcut.to_display_string(),
            capturing: status.capturing,
            hotkey_registered: hotkey_registered && status.listening,
            muted,
            uptime_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_request_serialization() {
        let req = Request::SaveShortcut {
            keys: vec!["LEFT CTRL".into(), "M".into()],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("save_shortcut"));
        assert!(json.contains("LEFT CTRL"));
    }

    #[test]
    fn test_capture_request_timings_are_optional() {
        let req: Request = serde_json::from_str(r#"{"type":"capture_shortcut"}"#).unwrap();
        assert_eq!(
            req,
            Request::CaptureShortcut {
                finish_after_key_down_ms: None,
                fail_delay_ms: None,
            }
        );

        let config = Request::capture_config(None, Some(200), CaptureConfig::default());
        assert_eq!(config.finish_after_key_down, Duration::from_millis(1000));
        assert_eq!(config.fail_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_response_serialization() {
        let status = EngineStatus {
            shortcut: Shortcut::default_shortcut(),
            capturing: false,
            listening: true,
        };
        let resp = Response::Status(DaemonStatus::from_engine(&status, true, Some(true), 3));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("LEFT CTRL + LEFT ALT"));
        assert!(json.contains(r#""muted":true"#));

        let unknown = DaemonStatus::from_engine(&status, true, None, 3);
        assert!(serde_json::to_string(&unknown).unwrap().contains(r#""muted":null"#));
    }

    #[test]
    fn test_capture_outcomes() {
        let captured = Response::from_capture(Ok(Shortcut::new(["A", "B"])));
        assert_eq!(
            captured,
            Response::Captured {
                keys: vec!["A".into(), "B".into()],
                display: "A + B".into(),
            }
        );

        let timed_out = Response::from_capture(Err(CaptureError::TimedOut {
            delay: Duration::from_millis(5000),
        }));
        assert_eq!(timed_out, Response::CaptureTimedOut { fail_delay_ms: 5000 });

        let busy = Response::from_capture(Err(CaptureError::InProgress));
        assert!(matches!(busy, Response::Error { code, .. } if code == "capture_in_progress"));
    }
}
