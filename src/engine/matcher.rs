//! Trigger matcher
//!
//! Tracks the pressed-key set and fires once each time the configured
//! shortcut goes from "not fully held" to "fully held". A latch keeps it
//! from firing again on unrelated key events while the chord stays down.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::hotkey::{KeyEvent, KeyState};
use crate::shortcut::Shortcut;

/// Action run on every rising edge of the shortcut
pub type TriggerCallback = Box<dyn FnMut() + Send + 'static>;

pub struct TriggerMatcher {
    shortcut: Shortcut,
    pressed: HashSet<String>,
    /// Set on the rising edge, cleared when any shortcut key is released
    satisfied: bool,
    on_trigger: TriggerCallback,
}

impl TriggerMatcher {
    pub fn new(shortcut: Shortcut, on_trigger: TriggerCallback) -> Self {
        Self {
            shortcut,
            pressed: HashSet::new(),
            satisfied: false,
            on_trigger,
        }
    }

    pub fn shortcut(&self) -> &Shortcut {
        &self.shortcut
    }

    /// Replace the shortcut being matched; matching restarts from a clean state
    pub fn set_shortcut(&mut self, shortcut: Shortcut) {
        debug!(shortcut = %shortcut, "trigger shortcut updated");
        self.shortcut = shortcut;
        self.reset();
    }

    /// Forget all pressed keys and drop the latch.
    ///
    /// Called whenever the matcher stops receiving events, so the next
    /// attachment never sees state from before the gap.
    pub fn reset(&mut self) {
        self.pressed.clear();
        self.satisfied = false;
    }

    /// Feed one raw key event. Returns `true` if the trigger fired.
    pub fn handle(&mut self, event: &KeyEvent) -> bool {
        if !event.is_named() {
            return false;
        }

        match event.state {
            KeyState::Down => {
                self.pressed.insert(event.name.clone());
            }
            KeyState::Up => {
                self.pressed.remove(&event.name);
            }
        }

        let matched = self.shortcut.is_satisfied_by(&self.pressed);
        let fired = matched && !self.satisfied;
        self.satisfied = matched;

        if fired {
            debug!(shortcut = %self.shortcut, "shortcut triggered");
            (self.on_trigger)();
        } else {
            trace!(%event, matched, "key event did not trigger");
        }

        fired
    }
}
