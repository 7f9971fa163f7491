//! Interactive shortcut capture
//!
//! Records a new chord from raw key events. Two timers decide how a
//! session ends:
//! - the commit timer restarts on every new key-down and commits the chord
//!   once the user has held keys without adding another for
//!   `finish_after_key_down`;
//! - the fail timer only runs while no key is held, and ends the session
//!   with a timeout after `fail_delay`.
//!
//! Released keys stay part of the chord, so a user may let go and press
//! more keys before the fail timer runs out.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use super::timer::Timer;
use crate::hotkey::{Attachment, KeyEvent, KeyEventSource, KeyState, SourceError};
use crate::shortcut::Shortcut;

/// Default settle time after the last new key-down
pub const DEFAULT_FINISH_AFTER_KEY_DOWN: Duration = Duration::from_millis(1000);

/// Default time a session may sit with no keys held
pub const DEFAULT_FAIL_DELAY: Duration = Duration::from_millis(5000);

/// Timing of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub finish_after_key_down: Duration,
    pub fail_delay: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            finish_after_key_down: DEFAULT_FINISH_AFTER_KEY_DOWN,
            fail_delay: DEFAULT_FAIL_DELAY,
        }
    }
}

/// Errors that end a capture session without a shortcut
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("timed out after {}ms", .delay.as_millis())]
    TimedOut { delay: Duration },

    #[error("cannot start capture: {0}")]
    Source(#[from] SourceError),

    #[error("key event source closed during capture")]
    SourceClosed,

    #[error("a capture session is already running")]
    InProgress,
}

pub type CaptureResult = Result<Shortcut, CaptureError>;

/// Where the session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    /// No key held; the fail timer is armed
    Idle,
    /// At least one key held; the commit timer is armed
    Accumulating,
    Committed,
    Failed,
}

impl CapturePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, CapturePhase::Committed | CapturePhase::Failed)
    }
}

/// Clock-injected capture state machine
#[derive(Debug)]
pub struct CaptureMachine {
    config: CaptureConfig,
    phase: CapturePhase,
    /// Every key pressed this session, in first-press order
    candidate: Vec<String>,
    held: HashSet<String>,
    commit_timer: Timer,
    fail_timer: Timer,
}

impl CaptureMachine {
    /// Start a session at `now` with the fail timer armed
    pub fn new(config: CaptureConfig, now: Instant) -> Self {
        let mut fail_timer = Timer::new();
        fail_timer.schedule(now, config.fail_delay);

        Self {
            config,
            phase: CapturePhase::Idle,
            candidate: Vec::new(),
            held: HashSet::new(),
            commit_timer: Timer::new(),
            fail_timer,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    /// Keys recorded so far, in first-press order
    pub fn candidate(&self) -> &[String] {
        &self.candidate
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.commit_timer.deadline(), self.fail_timer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Feed one raw key event received at `now`
    pub fn on_key(&mut self, event: &KeyEvent, now: Instant) {
        if self.phase.is_terminal() || !event.is_named() {
            return;
        }

        match event.state {
            KeyState::Down => {
                // Auto-repeat of a key that is already held
                if !self.held.insert(event.name.clone()) {
                    return;
                }
                if !self.candidate.contains(&event.name) {
                    self.candidate.push(event.name.clone());
                }

                self.fail_timer.cancel();
                self.commit_timer
                    .schedule(now, self.config.finish_after_key_down);
                self.phase = CapturePhase::Accumulating;

                debug!(key = %event.name, candidate = ?self.candidate, "capture key down");
            }
            KeyState::Up => {
                if !self.held.remove(&event.name) {
                    return;
                }

                if self.held.is_empty() {
                    self.commit_timer.cancel();
                    self.fail_timer.schedule(now, self.config.fail_delay);
                    self.phase = CapturePhase::Idle;

                    debug!(candidate = ?self.candidate, "all keys released, waiting");
                }
            }
        }
    }

    /// Fire whichever timer is due at `now`.
    ///
    /// Returns the outcome once the session reaches a terminal phase, and
    /// `None` while it is still open or has already resolved.
    pub fn on_deadline(&mut self, now: Instant) -> Option<CaptureResult> {
        if self.phase.is_terminal() {
            return None;
        }

        if self.commit_timer.is_due(now) {
            self.commit_timer.cancel();
            self.phase = CapturePhase::Committed;

            // Armed only by a key-down, so the candidate list is never empty
            let keys = std::mem::take(&mut self.candidate);
            return Some(Ok(Shortcut::new(keys)));
        }

        if self.fail_timer.is_due(now) {
            self.fail_timer.cancel();
            self.phase = CapturePhase::Failed;
            return Some(Err(CaptureError::TimedOut {
                delay: self.config.fail_delay,
            }));
        }

        None
    }
}

/// A capture session bound to the key event source
pub struct CaptureSession {
    attachment: Attachment,
    machine: CaptureMachine,
}

impl CaptureSession {
    /// Attach to `source` and start the clock.
    ///
    /// Attaching happens here rather than in [`run`](Self::run) so that no
    /// event published after this call is missed.
    pub fn start(source: &KeyEventSource, config: CaptureConfig) -> Result<Self, CaptureError> {
        let attachment = source.attach()?;
        info!(
            finish_after_ms = config.finish_after_key_down.as_millis() as u64,
            fail_delay_ms = config.fail_delay.as_millis() as u64,
            "shortcut capture started"
        );

        Ok(Self {
            attachment,
            machine: CaptureMachine::new(config, Instant::now()),
        })
    }

    /// Drive the session until it commits or fails, then detach.
    ///
    /// Key events and timer expiries are handled one at a time on this task.
    pub async fn run(mut self) -> CaptureResult {
        let result = loop {
            let deadline = self.machine.next_deadline();
            let timer = async {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            // Queued key events first, so a key pressed before a deadline
            // is never overtaken by that deadline
            tokio::select! {
                biased;

                event = self.attachment.recv() => match event {
                    Some(event) => self.machine.on_key(&event, Instant::now()),
                    None => break Err(CaptureError::SourceClosed),
                },
                _ = timer => {
                    if let Some(result) = self.machine.on_deadline(Instant::now()) {
                        break result;
                    }
                }
            }
        };

        self.attachment.detach();

        match &result {
            Ok(shortcut) => info!(shortcut = %shortcut, "shortcut captured"),
            Err(e) => info!(error = %e, "shortcut capture failed"),
        }

        result
    }
}

/// Record a new shortcut from the keyboard
pub async fn capture_shortcut(source: &KeyEventSource, config: CaptureConfig) -> CaptureResult {
    CaptureSession::start(source, config)?.run().await
}
