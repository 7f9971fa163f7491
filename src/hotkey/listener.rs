//! Global keyboard hook
//!
//! Runs the platform event tap on a dedicated thread and publishes every
//! key transition into a [`KeyEventSource`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{error, info};

use super::source::KeyEventSource;

/// Global keyboard hook feeding a [`KeyEventSource`]
pub struct HotkeyListener {
    source: KeyEventSource,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new listener publishing into `source`
    pub fn new(source: KeyEventSource) -> Self {
        Self {
            source,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the keyboard hook
    ///
    /// This spawns a dedicated thread that runs the platform event loop.
    /// The hook runs until `stop()` is called or the program exits.
    pub fn start(&self) -> Result<(), HotkeyError> {
        if !cfg!(target_os = "macos") {
            return Err(HotkeyError::Unsupported);
        }

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let source = self.source.clone();
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                if let Err(e) = platform::run_event_loop(source, running.clone()) {
                    error!(?e, "hotkey listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(HotkeyError::ThreadSpawn(e.to_string()));
        }

        Ok(())
    }

    /// Stop the keyboard hook; the run loop exits at its next poll
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("global key capture is not supported on this platform")]
    Unsupported,
}

#[cfg(target_os = "macos")]
use super::macos as platform;

#[cfg(not(target_os = "macos"))]
mod platform {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::{HotkeyError, KeyEventSource};

    pub fn run_event_loop(
        _source: KeyEventSource,
        _running: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        Err(HotkeyError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_creation() {
        let listener = HotkeyListener::new(KeyEventSource::new());
        assert!(!listener.is_running());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_start_unsupported_platform() {
        let listener = HotkeyListener::new(KeyEventSource::new());
        assert!(matches!(listener.start(), Err(HotkeyError::Unsupported)));
        assert!(!listener.is_running());
    }
}
