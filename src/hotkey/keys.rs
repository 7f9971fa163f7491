//! Key event definitions and hardware keycode naming
//!
//! Key names follow the `"LEFT CTRL"` / `"A"` / `"F5"` style used in the
//! persisted shortcut file, so a captured chord can be written and matched
//! without translation.

use serde::{Deserialize, Serialize};

/// Physical transition of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyState {
    Down,
    Up,
}

/// One raw key transition from the keyboard hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub name: String,
    pub state: KeyState,
}

impl KeyEvent {
    pub fn new(name: impl Into<String>, state: KeyState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    pub fn down(name: impl Into<String>) -> Self {
        Self::new(name, KeyState::Down)
    }

    pub fn up(name: impl Into<String>) -> Self {
        Self::new(name, KeyState::Up)
    }

    /// Events without a usable key name are ignored by every consumer
    pub fn is_named(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

impl std::fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arrow = match self.state {
            KeyState::Down => "DOWN",
            KeyState::Up => "UP",
        };
        write!(f, "{} {}", self.name, arrow)
    }
}

/// Device-dependent modifier bits in `CGEventFlags`, one per physical key
const LEFT_CTRL_MASK: u64 = 0x0000_0001;
const LEFT_SHIFT_MASK: u64 = 0x0000_0002;
const RIGHT_SHIFT_MASK: u64 = 0x0000_0004;
const LEFT_CMD_MASK: u64 = 0x0000_0008;
const RIGHT_CMD_MASK: u64 = 0x0000_0010;
const LEFT_ALT_MASK: u64 = 0x0000_0020;
const RIGHT_ALT_MASK: u64 = 0x0000_0040;
const RIGHT_CTRL_MASK: u64 = 0x0000_2000;
const FN_MASK: u64 = 0x0080_0000;

/// How the OS reports a modifier key, which arrives as a flag change
/// rather than a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Down while this flag bit is set
    Held(u64),
    /// Caps Lock: the flag tracks the lock state, not the key
    Toggle,
}

/// Map a macOS virtual keycode to the modifier it controls, if any
pub fn modifier_for_keycode(keycode: u16) -> Option<Modifier> {
    let mask = match keycode {
        0x3B => LEFT_CTRL_MASK,
        0x3E => RIGHT_CTRL_MASK,
        0x3A => LEFT_ALT_MASK,
        0x3D => RIGHT_ALT_MASK,
        0x37 => LEFT_CMD_MASK,
        0x36 => RIGHT_CMD_MASK,
        0x38 => LEFT_SHIFT_MASK,
        0x3C => RIGHT_SHIFT_MASK,
        0x3F => FN_MASK,
        0x39 => return Some(Modifier::Toggle),
        _ => return None,
    };
    Some(Modifier::Held(mask))
}

/// Key transitions for one flags-changed event of `keycode`.
///
/// Left and right keys share the generic modifier flag, so each side is
/// read from its own device bit. Caps Lock yields a full press per event.
pub fn flags_changed_events(keycode: u16, flags: u64) -> Vec<KeyEvent> {
    let (Some(name), Some(modifier)) = (key_name(keycode), modifier_for_keycode(keycode)) else {
        return Vec::new();
    };

    match modifier {
        Modifier::Held(mask) if flags & mask != 0 => vec![KeyEvent::down(name)],
        Modifier::Held(_) => vec![KeyEvent::up(name)],
        Modifier::Toggle => vec![KeyEvent::down(name), KeyEvent::up(name)],
    }
}

/// Map a macOS virtual keycode (ANSI layout) to its key name
pub fn key_name(keycode: u16) -> Option<&'static str> {
    let name = match keycode {
        0x00 => "A",
        0x01 => "S",
        0x02 => "D",
        0x03 => "F",
        0x04 => "H",
        0x05 => "G",
        0x06 => "Z",
        0x07 => "X",
        0x08 => "C",
        0x09 => "V",
        0x0B => "B",
        0x0C => "Q",
        0x0D => "W",
        0x0E => "E",
        0x0F => "R",
        0x10 => "Y",
        0x11 => "T",
        0x12 => "1",
        0x13 => "2",
        0x14 => "3",
        0x15 => "4",
        0x16 => "6",
        0x17 => "5",
        0x18 => "EQUALS",
        0x19 => "9",
        0x1A => "7",
        0x1B => "MINUS",
        0x1C => "8",
        0x1D => "0",
        0x1E => "SQUARE BRACKET CLOSE",
        0x1F => "O",
        0x20 => "U",
        0x21 => "SQUARE BRACKET OPEN",
        0x22 => "I",
        0x23 => "P",
        0x24 => "RETURN",
        0x25 => "L",
        0x26 => "J",
        0x27 => "QUOTE",
        0x28 => "K",
        0x29 => "SEMICOLON",
        0x2A => "BACKSLASH",
        0x2B => "COMMA",
        0x2C => "FORWARD SLASH",
        0x2D => "N",
        0x2E => "M",
        0x2F => "DOT",
        0x30 => "TAB",
        0x31 => "SPACE",
        0x32 => "SECTION",
        0x33 => "BACKSPACE",
        0x35 => "ESCAPE",
        0x36 => "RIGHT META",
        0x37 => "LEFT META",
        0x38 => "LEFT SHIFT",
        0x39 => "CAPS LOCK",
        0x3A => "LEFT ALT",
        0x3B => "LEFT CTRL",
        0x3C => "RIGHT SHIFT",
        0x3D => "RIGHT ALT",
        0x3E => "RIGHT CTRL",
        0x3F => "FN",
        0x40 => "F17",
        0x48 => "VOLUME UP",
        0x49 => "VOLUME DOWN",
        0x4A => "MUTE",
        0x4F => "F18",
        0x50 => "F19",
        0x5A => "F20",
        0x60 => "F5",
        0x61 => "F6",
        0x62 => "F7",
        0x63 => "F3",
        0x64 => "F8",
        0x65 => "F9",
        0x67 => "F11",
        0x69 => "F13",
        0x6A => "F16",
        0x6B => "F14",
        0x6D => "F10",
        0x6F => "F12",
        0x71 => "F15",
        0x72 => "INS",
        0x73 => "HOME",
        0x74 => "PAGE UP",
        0x75 => "DELETE",
        0x76 => "F4",
        0x77 => "END",
        0x78 => "F2",
        0x79 => "PAGE DOWN",
        0x7A => "F1",
        0x7B => "LEFT ARROW",
        0x7C => "RIGHT ARROW",
        0x7D => "DOWN ARROW",
        0x7E => "UP ARROW",
        0x41 => "NUMPAD DOT",
        0x43 => "NUMPAD MULTIPLY",
        0x45 => "NUMPAD PLUS",
        0x47 => "NUMPAD CLEAR",
        0x4B => "NUMPAD DIVIDE",
        0x4C => "NUMPAD RETURN",
        0x4E => "NUMPAD MINUS",
        0x51 => "NUMPAD EQUALS",
        0x52 => "NUMPAD 0",
        0x53 => "NUMPAD 1",
        0x54 => "NUMPAD 2",
        0x55 => "NUMPAD 3",
        0x56 => "NUMPAD 4",
        0x57 => "NUMPAD 5",
        0x58 => "NUMPAD 6",
        0x59 => "NUMPAD 7",
        0x5B => "NUMPAD 8",
        0x5C => "NUMPAD 9",
        _ => return None,
    };
    Some(name)
}
