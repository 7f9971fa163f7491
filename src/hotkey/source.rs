//! Single-consumer fan-in point for raw key events
//!
//! The platform hook publishes every key transition here. At most one
//! consumer (the trigger matcher or a capture session) is attached at a
//! time; each attachment gets its own channel so nothing published before
//! it attached, or after it detached, can reach it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::keys::KeyEvent;

/// Errors returned when attaching to the source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("key event source already has an attached listener")]
    AlreadyAttached,
}

struct Slot {
    id: u64,
    tx: mpsc::UnboundedSender<KeyEvent>,
}

#[derive(Default)]
struct Inner {
    slot: Mutex<Option<Slot>>,
    next_id: AtomicU64,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<Slot>> {
        // A panic while holding the lock cannot leave the slot half-written
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable handle to the process-wide key event stream
#[derive(Clone, Default)]
pub struct KeyEventSource {
    inner: Arc<Inner>,
}

impl KeyEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to the attached listener, if any.
    ///
    /// Never blocks, so it is safe to call from the OS hook callback.
    pub fn publish(&self, event: KeyEvent) {
        let mut slot = self.inner.slot();
        match slot.as_ref() {
            Some(attached) => {
                trace!(%event, listener = attached.id, "publishing key event");
                if attached.tx.send(event).is_err() {
                    debug!(listener = attached.id, "listener gone, clearing slot");
                    *slot = None;
                }
            }
            None => trace!(%event, "no listener attached, dropping key event"),
        }
    }

    /// Attach a new listener.
    ///
    /// Fails if another attachment is still live; callers must detach the
    /// previous one first.
    pub fn attach(&self) -> Result<Attachment, SourceError> {
        let mut slot = self.inner.slot();
        if slot.as_ref().is_some_and(|s| !s.tx.is_closed()) {
            return Err(SourceError::AlreadyAttached);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(Slot { id, tx });
        debug!(listener = id, "listener attached");

        Ok(Attachment {
            id,
            source: self.clone(),
            rx,
            attached: true,
        })
    }

    /// Whether a live listener is currently attached
    pub fn is_attached(&self) -> bool {
        self.inner
            .slot()
            .as_ref()
            .is_some_and(|s| !s.tx.is_closed())
    }

    fn release(&self, id: u64) {
        let mut slot = self.inner.slot();
        if slot.as_ref().is_some_and(|s| s.id == id) {
            *slot = None;
            debug!(listener = id, "listener detached");
        }
    }
}

/// Exclusive subscription to the key event stream.
///
/// Dropping it detaches.
pub struct Attachment {
    id: u64,
    source: KeyEventSource,
    rx: mpsc::UnboundedReceiver<KeyEvent>,
    attached: bool,
}

impl Attachment {
    /// Next event in arrival order, or `None` once detached
    pub async fn recv(&mut self) -> Option<KeyEvent> {
        if !self.attached {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop receiving events. Calling this more than once is harmless.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        self.source.release(self.id);
        self.rx.close();
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_attach_is_rejected() {
        let source = KeyEventSource::new();
        let _first = source.attach().unwrap();
        assert_eq!(source.attach().err(), Some(SourceError::AlreadyAttached));
    }

    #[test]
    fn test_detach_is_idempotent_and_frees_source() {
        let source = KeyEventSource::new();
        let mut first = source.attach().unwrap();
        first.detach();
        first.detach();
        assert!(!first.is_attached());
        assert!(!source.is_attached());

        let _second = source.attach().unwrap();
        assert!(source.is_attached());
    }

    #[test]
    fn test_drop_detaches() {
        let source = KeyEventSource::new();
        {
            let _attachment = source.attach().unwrap();
            assert!(source.is_attached());
        }
        assert!(!source.is_attached());
        assert!(source.attach().is_ok());
    }

    #[test]
    fn test_stale_detach_does_not_release_new_listener() {
        let source = KeyEventSource::new();
        let mut first = source.attach().unwrap();
        first.detach();
        let _second = source.attach().unwrap();

        drop(first);
        assert!(source.is_attached());
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let source = KeyEventSource::new();
        let mut attachment = source.attach().unwrap();

        source.publish(KeyEvent::down("A"));
        source.publish(KeyEvent::down("B"));
        source.publish(KeyEvent::up("A"));

        assert_eq!(attachment.recv().await, Some(KeyEvent::down("A")));
        assert_eq!(attachment.recv().await, Some(KeyEvent::down("B")));
        assert_eq!(attachment.recv().await, Some(KeyEvent::up("A")));
    }

    #[tokio::test]
    async fn test_fresh_attachment_sees_no_stale_events() {
        let source = KeyEventSource::new();
        source.publish(KeyEvent::down("A"));

        let mut first = source.attach().unwrap();
        source.publish(KeyEvent::down("B"));
        first.detach();
        source.publish(KeyEvent::down("C"));

        let mut second = source.attach().unwrap();
        source.publish(KeyEvent::down("D"));

        assert_eq!(second.recv().await, Some(KeyEvent::down("D")));
        assert_eq!(first.recv().await, None);
    }
}
