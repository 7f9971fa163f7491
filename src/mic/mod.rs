//! Microphone mute control
//!
//! The engine only decides *when* to toggle; this module performs the
//! toggle. On macOS the input volume is driven through `osascript`.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::EngineEvent;

/// Errors from the platform mute control
#[derive(Debug, thiserror::Error)]
pub enum MicError {
    #[error("microphone control is not supported on this platform")]
    Unsupported,

    #[error("failed to run osascript: {0}")]
    Spawn(#[from] std::io::Error),

    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    #[error("AppleScript error: {0}")]
    Script(String),

    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    #[error("unexpected input volume '{0}'")]
    Parse(String),
}

/// Something that can mute and unmute the default input device
pub trait Microphone: Send + Sync {
    /// Current mute state
    fn is_muted(&self) -> Result<bool, MicError>;

    /// Flip the mute state, returning the new state
    fn toggle(&self) -> Result<bool, MicError>;
}

/// The microphone implementation for the current platform
pub fn system_microphone() -> Arc<dyn Microphone> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(applescript::InputVolume::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(UnsupportedMicrophone)
    }
}

/// Placeholder for platforms without a mute implementation
#[cfg_attr(target_os = "macos", allow(dead_code))]
pub struct UnsupportedMicrophone;

impl Microphone for UnsupportedMicrophone {
    fn is_muted(&self) -> Result<bool, MicError> {
        Err(MicError::Unsupported)
    }

    fn toggle(&self) -> Result<bool, MicError> {
        Err(MicError::Unsupported)
    }
}

/// Run toggle requests off the reactor task.
///
/// The trigger matcher only enqueues a request; the blocking platform call
/// happens here, followed by a [`EngineEvent::MuteToggled`] broadcast.
pub async fn run_toggle_worker(
    mic: Arc<dyn Microphone>,
    mut requests: mpsc::UnboundedReceiver<()>,
    event_tx: broadcast::Sender<EngineEvent>,
) {
    info!("mute worker started");

    while requests.recv().await.is_some() {
        let mic = Arc::clone(&mic);
        match tokio::task::spawn_blocking(move || mic.toggle()).await {
            Ok(Ok(muted)) => {
                info!(muted, "microphone toggled");
                let _ = event_tx.send(EngineEvent::MuteToggled { muted });
            }
            Ok(Err(MicError::Unsupported)) => {
                warn!("shortcut pressed but microphone control is unsupported here");
            }
            Ok(Err(e)) => error!(?e, "failed to toggle microphone"),
            Err(e) => error!(?e, "mute toggle task panicked"),
        }
    }

    debug!("mute worker stopped");
}

#[cfg(target_os = "macos")]
mod applescript {
    use std::process::Command;
    use std::sync::Mutex;

    use tracing::debug;

    use super::{MicError, Microphone};

    /// Input level restored on unmute when the pre-mute level is unknown
    const DEFAULT_INPUT_VOLUME: u8 = 75;

    /// Mutes by setting the input volume to zero and restoring it afterwards
    pub struct InputVolume {
        restore_level: Mutex<u8>,
    }

    impl InputVolume {
        pub fn new() -> Self {
            Self {
                restore_level: Mutex::new(DEFAULT_INPUT_VOLUME),
            }
        }

        fn input_volume(&self) -> Result<u8, MicError> {
            let out = run_applescript("input volume of (get volume settings)")?;
            out.parse::<u8>().map_err(|_| MicError::Parse(out))
        }

        fn set_input_volume(&self, level: u8) -> Result<(), MicError> {
            run_applescript(&format!("set volume input volume {}", level.min(100))).map(|_| ())
        }
    }

    impl Microphone for InputVolume {
        fn is_muted(&self) -> Result<bool, MicError> {
            Ok(self.input_volume()? == 0)
        }

        fn toggle(&self) -> Result<bool, MicError> {
            let level = self.input_volume()?;
            let mut restore = self
                .restore_level
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if level == 0 {
                self.set_input_volume(*restore)?;
                Ok(false)
            } else {
                *restore = level;
                self.set_input_volume(0)?;
                Ok(true)
            }
        }
    }

    fn run_applescript(script: &str) -> Result<String, MicError> {
        debug!(script = %script, "executing AppleScript");

        let output = Command::new("osascript").arg("-e").arg(script).output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MicError::Script(stderr.trim().to_string()))
        }
    }
}

/// In-memory microphone for tests
#[cfg(test)]
pub mod fake {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::{MicError, Microphone};

    pub struct FakeMicrophone {
        muted: AtomicBool,
    }

    impl FakeMicrophone {
        pub fn new(muted: bool) -> Self {
            Self {
                muted: AtomicBool::new(muted),
            }
        }
    }

    impl Microphone for FakeMicrophone {
        fn is_muted(&self) -> Result<bool, MicError> {
            Ok(self.muted.load(Ordering::SeqCst))
        }

        fn toggle(&self) -> Result<bool, MicError> {
            Ok(!self.muted.fetch_xor(true, Ordering::SeqCst))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeMicrophone;
    use super::*;

    #[tokio::test]
    async fn test_worker_toggles_and_broadcasts() {
        let mic = Arc::new(FakeMicrophone::new(false));
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = broadcast::channel(8);

        let worker = tokio::spawn(run_toggle_worker(mic.clone(), req_rx, event_tx));
        req_tx.send(()).unwrap();
        req_tx.send(()).unwrap();

        assert_eq!(
            event_rx.recv().await.unwrap(),
            EngineEvent::MuteToggled { muted: true }
        );
        assert_eq!(
            event_rx.recv().await.unwrap(),
            EngineEvent::MuteToggled { muted: false }
        );

        drop(req_tx);
        worker.await.unwrap();
        assert!(!mic.is_muted().unwrap());
    }

    #[tokio::test]
    async fn test_worker_survives_unsupported_platform() {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = broadcast::channel(8);

        let worker = tokio::spawn(run_toggle_worker(
            Arc::new(UnsupportedMicrophone),
            req_rx,
            event_tx,
        ));
        req_tx.send(()).unwrap();
        drop(req_tx);
        worker.await.unwrap();

        assert!(event_rx.try_recv().is_err());
    }
}
