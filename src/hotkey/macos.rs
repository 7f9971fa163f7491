//! macOS keyboard hook using CGEventTap
//!
//! Runs its own CFRunLoop and turns KeyDown/KeyUp/FlagsChanged events into
//! named [`KeyEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventType, EventField,
};
use tracing::{debug, error, info, warn};

use super::keys::{flags_changed_events, key_name, KeyEvent, KeyState};
use super::listener::HotkeyError;
use super::source::KeyEventSource;

/// Raw data copied out of the tap callback
struct RawKey {
    event_type: CGEventType,
    keycode: u16,
    flags: CGEventFlags,
}

/// Run the CFRunLoop with the event tap
pub fn run_event_loop(
    source: KeyEventSource,
    running: Arc<AtomicBool>,
) -> Result<(), HotkeyError> {
    let (callback_tx, callback_rx) = std::sync::mpsc::channel::<RawKey>();

    // CGEventTap callback - must be fast and non-blocking
    let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
                         -> Option<CGEvent> {
        match event_type {
            CGEventType::KeyDown | CGEventType::KeyUp | CGEventType::FlagsChanged => {
                let keycode =
                    event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
                let _ = callback_tx.send(RawKey {
                    event_type,
                    keycode,
                    flags: event.get_flags(),
                });
            }
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                warn!("event tap disabled, will re-enable");
            }
            _ => {}
        }
        Some(event.clone())
    };

    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    )
    .map_err(|_| {
        error!("failed to create event tap - is Accessibility permission granted?");
        HotkeyError::EventTapCreation
    })?;

    tap.enable();

    let run_loop_source = tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|_| HotkeyError::EventTapCreation)?;
    let run_loop = CFRunLoop::get_current();

    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }

    info!("event tap created and enabled");

    while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(
                kCFRunLoopDefaultMode,
                std::time::Duration::from_millis(100),
                true,
            );
        }

        while let Ok(raw) = callback_rx.try_recv() {
            let events = to_key_events(&raw);
            if events.is_empty() {
                debug!(keycode = raw.keycode, "ignoring unmapped keycode");
            }
            for event in events {
                source.publish(event);
            }
        }
    }

    Ok(())
}

fn to_key_events(raw: &RawKey) -> Vec<KeyEvent> {
    let state = match raw.event_type {
        CGEventType::KeyDown => KeyState::Down,
        CGEventType::KeyUp => KeyState::Up,
        CGEventType::FlagsChanged => return flags_changed_events(raw.keycode, raw.flags.bits()),
        _ => return Vec::new(),
    };
    key_name(raw.keycode)
        .map(|name| vec![KeyEvent::new(name, state)])
        .unwrap_or_default()
}
