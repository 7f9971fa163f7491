//! Engine reactor
//!
//! One task owns the shortcut store, the trigger matcher and any running
//! capture session. Key events, capture timers and control commands are
//! handled strictly one at a time by this task's select loop, so no two
//! handlers ever touch engine state concurrently.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::capture::{CaptureConfig, CaptureError, CaptureResult, CaptureSession};
use super::matcher::{TriggerCallback, TriggerMatcher};
use crate::events::EngineEvent;
use crate::hotkey::{Attachment, KeyEvent, KeyEventSource};
use crate::shortcut::{Shortcut, ShortcutStore, StoreError};

/// Snapshot of the engine for status queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// The committed shortcut
    pub shortcut: Shortcut,
    /// A capture session is running
    pub capturing: bool,
    /// The trigger matcher is attached to the key source
    pub listening: bool,
}

/// Requests handled by the reactor
#[derive(Debug)]
pub enum Command {
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Capture {
        config: CaptureConfig,
        reply: oneshot::Sender<CaptureResult>,
    },
    SaveShortcut {
        shortcut: Shortcut,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Errors returned by [`EngineHandle`] when the reactor is gone
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("engine is not running")]
    Stopped,
}

/// Cloneable front end for sending commands to the reactor
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    pub async fn status(&self) -> Result<EngineStatus, HandleError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Run a capture session; resolves when the session commits or fails
    pub async fn capture(&self, config: CaptureConfig) -> Result<CaptureResult, HandleError> {
        self.request(|reply| Command::Capture { config, reply }).await
    }

    /// Persist a confirmed shortcut and start matching it
    pub async fn save_shortcut(
        &self,
        shortcut: Shortcut,
    ) -> Result<Result<(), StoreError>, HandleError> {
        self.request(|reply| Command::SaveShortcut { shortcut, reply })
            .await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HandleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| HandleError::Stopped)?;
        reply_rx.await.map_err(|_| HandleError::Stopped)
    }
}

type SessionFuture = Pin<Box<dyn Future<Output = CaptureResult> + Send>>;

struct PendingCapture {
    fail_delay: Duration,
    session: SessionFuture,
    reply: oneshot::Sender<CaptureResult>,
}

/// Owner of all engine state
pub struct Reactor {
    source: KeyEventSource,
    store: ShortcutStore,
    matcher: TriggerMatcher,
    trigger: Option<Attachment>,
    capture: Option<PendingCapture>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl Reactor {
    /// Create a reactor matching the store's current shortcut
    pub fn new(
        source: KeyEventSource,
        store: ShortcutStore,
        on_trigger: TriggerCallback,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        let matcher = TriggerMatcher::new(store.current().clone(), on_trigger);
        Self {
            source,
            store,
            matcher,
            trigger: None,
            capture: None,
            event_tx,
        }
    }

    /// Run until every command sender has been dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.attach_trigger();
        info!(shortcut = %self.matcher.shortcut(), "engine started");

        loop {
            // Key events first, so a command never overtakes keys published before it
            tokio::select! {
                biased;

                event = next_trigger_event(&mut self.trigger) => match event {
                    Some(event) => {
                        self.matcher.handle(&event);
                    }
                    None => {
                        warn!("key source closed, trigger detached");
                        self.detach_trigger();
                    }
                },
                result = next_capture_result(&mut self.capture) => {
                    self.finish_capture(result);
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        self.detach_trigger();
        info!("engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Capture { config, reply } => self.start_capture(config, reply),
            Command::SaveShortcut { shortcut, reply } => {
                let _ = reply.send(self.save_shortcut(shortcut));
            }
        }
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            shortcut: self.store.current().clone(),
            capturing: self.capture.is_some(),
            listening: self.trigger.is_some(),
        }
    }

    fn start_capture(&mut self, config: CaptureConfig, reply: oneshot::Sender<CaptureResult>) {
        if self.capture.is_some() {
            let _ = reply.send(Err(CaptureError::InProgress));
            return;
        }

        // The capture session needs the key source to itself
        self.detach_trigger();

        match CaptureSession::start(&self.source, config) {
            Ok(session) => {
                self.capture = Some(PendingCapture {
                    fail_delay: config.fail_delay,
                    session: Box::pin(session.run()),
                    reply,
                });
                let _ = self.event_tx.send(EngineEvent::CaptureStarted);
            }
            Err(e) => {
                error!(error = %e, "failed to start capture");
                self.attach_trigger();
                let _ = reply.send(Err(e));
            }
        }
    }

    fn finish_capture(&mut self, result: CaptureResult) {
        let Some(pending) = self.capture.take() else {
            return;
        };

        let event = match &result {
            Ok(shortcut) => Some(EngineEvent::CaptureCommitted {
                keys: shortcut.keys().to_vec(),
            }),
            Err(CaptureError::TimedOut { .. }) => Some(EngineEvent::CaptureTimedOut {
                fail_delay_ms: pending.fail_delay.as_millis() as u64,
            }),
            Err(_) => None,
        };
        if let Some(event) = event {
            let _ = self.event_tx.send(event);
        }

        // Back to matching the committed shortcut until a save says otherwise
        self.attach_trigger();

        if pending.reply.send(result).is_err() {
            debug!("capture requester went away before the result");
        }
    }

    fn save_shortcut(&mut self, shortcut: Shortcut) -> Result<(), StoreError> {
        if let Err(e) = self.store.save(shortcut.clone()) {
            error!(error = %e, "failed to save shortcut, keeping previous");
            return Err(e);
        }

        self.matcher.set_shortcut(shortcut.clone());
        let _ = self.event_tx.send(EngineEvent::ShortcutSaved {
            keys: shortcut.keys().to_vec(),
        });
        Ok(())
    }

    fn attach_trigger(&mut self) {
        if self.trigger.is_some() {
            return;
        }

        match self.source.attach() {
            Ok(attachment) => {
                self.matcher.reset();
                self.trigger = Some(attachment);
                debug!("trigger matcher attached");
            }
            Err(e) => error!(error = %e, "failed to attach trigger matcher"),
        }
    }

    fn detach_trigger(&mut self) {
        if let Some(mut attachment) = self.trigger.take() {
            attachment.detach();
            self.matcher.reset();
            debug!("trigger matcher detached");
        }
    }
}

async fn next_trigger_event(trigger: &mut Option<Attachment>) -> Option<KeyEvent> {
    match trigger {
        Some(attachment) => attachment.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_capture_result(capture: &mut Option<PendingCapture>) -> CaptureResult {
    match capture {
        Some(pending) => pending.session.as_mut().await,
        None => std::future::pending().await,
    }
}
