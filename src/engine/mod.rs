//! Hotkey capture and matching engine
//!
//! - `TriggerMatcher`: fires once per press of the configured shortcut
//! - `CaptureSession`: records a new shortcut using a commit timer and a
//!   fail timer
//! - [`Reactor`]: the single task that owns both and the shortcut store

mod capture;
mod matcher;
mod reactor;
mod timer;

pub use capture::{CaptureConfig, CaptureError};
pub use reactor::{EngineHandle, EngineStatus, HandleError, Reactor};
