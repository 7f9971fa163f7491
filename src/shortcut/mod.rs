//! Shortcut model and persistence
//!
//! A shortcut is the chord that toggles the microphone. The store keeps
//! the committed one on disk as `{"keys": [...]}`.

mod chord;
mod store;

pub use chord::Shortcut;
pub use store::{ShortcutStore, StoreError};
