//! Hotkey module for global keyboard event listening
//!
//! The platform hook (CGEventTap on macOS) publishes named key transitions
//! into a [`KeyEventSource`], which hands them to exactly one attached
//! consumer at a time.

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod keys;
mod listener;
#[cfg(target_os = "macos")]
mod macos;
mod source;

pub use keys::{KeyEvent, KeyState};
pub use listener::HotkeyListener;
pub use source::{Attachment, KeyEventSource, SourceError};
