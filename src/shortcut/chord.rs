//! The shortcut chord: an ordered, duplicate-free list of key names
//!
//! Order is the order in which keys were first pressed and only matters
//! for display. Matching against live keyboard state is set-based.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Keys used when nothing valid has been persisted yet
pub const DEFAULT_KEYS: [&str; 2] = ["LEFT CTRL", "LEFT ALT"];

/// Separator used by [`Shortcut::to_display_string`]
const DISPLAY_SEPARATOR: &str = " + ";

/// Reasons a list of key names cannot form a shortcut
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShortcutError {
    #[error("shortcut must contain at least one key")]
    Empty,

    #[error("shortcut contains a blank key name")]
    BlankKey,

    #[error("key '{0}' appears more than once")]
    DuplicateKey(String),
}

/// One key combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ShortcutRecord", into = "ShortcutRecord")]
pub struct Shortcut {
    keys: Vec<String>,
}

/// On-disk form: `{"keys": ["LEFT CTRL", "LEFT ALT"]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortcutRecord {
    pub keys: Vec<String>,
}

impl Shortcut {
    /// Build a shortcut from keys that are known to be valid.
    ///
    /// # Panics
    ///
    /// Panics if `keys` is empty or has blank or repeated names. Every code path
    /// that builds a shortcut from untrusted input goes through
    /// [`Shortcut::try_from`] instead.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        match Self::try_from(keys) {
            Ok(shortcut) => shortcut,
            Err(e) => panic!("invalid shortcut: {e}"),
        }
    }

    /// The hardcoded fallback shortcut
    pub fn default_shortcut() -> Self {
        Self::new(DEFAULT_KEYS)
    }

    /// Key names in first-press order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Whether every key of the chord is contained in `pressed`
    pub fn is_satisfied_by(&self, pressed: &HashSet<String>) -> bool {
        self.keys.iter().all(|k| pressed.contains(k))
    }

    /// Keys joined by `" + "` in stored order
    pub fn to_display_string(&self) -> String {
        self.keys.join(DISPLAY_SEPARATOR)
    }
}

impl TryFrom<Vec<String>> for Shortcut {
    type Error = ShortcutError;

    fn try_from(keys: Vec<String>) -> Result<Self, Self::Error> {
        if keys.is_empty() {
            return Err(ShortcutError::Empty);
        }

        for (i, key) in keys.iter().enumerate() {
            if key.trim().is_empty() {
                return Err(ShortcutError::BlankKey);
            }
            if keys[..i].contains(key) {
                return Err(ShortcutError::DuplicateKey(key.clone()));
            }
        }

        Ok(Self { keys })
    }
}

impl TryFrom<ShortcutRecord> for Shortcut {
    type Error = ShortcutError;

    fn try_from(record: ShortcutRecord) -> Result<Self, Self::Error> {
        Self::try_from(record.keys)
    }
}

impl From<Shortcut> for ShortcutRecord {
    fn from(shortcut: Shortcut) -> Self {
        Self {
            keys: shortcut.keys,
        }
    }
}

impl std::fmt::Display for Shortcut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_string_keeps_order() {
        let shortcut = Shortcut::new(["LEFT ALT", "M"]);
        assert_eq!(shortcut.to_display_string(), "LEFT ALT + M");
        assert_eq!(shortcut.to_string(), "LEFT ALT + M");
    }

    #[test]
    fn test_single_key_display() {
        let shortcut = Shortcut::new(["F13"]);
        assert_eq!(shortcut.to_display_string(), "F13");
    }

    #[test]
    fn test_default_shortcut() {
        let shortcut = Shortcut::default_shortcut();
        assert_eq!(shortcut.keys(), &["LEFT CTRL", "LEFT ALT"]);
    }

    #[test]
    fn test_try_from_rejects_empty() {
        assert_eq!(Shortcut::try_from(Vec::<String>::new()), Err(ShortcutError::Empty));
    }

    #[test]
    fn test_try_from_rejects_duplicates() {
        let keys = vec!["A".to_string(), "B".to_string(), "A".to_string()];
        assert_eq!(
            Shortcut::try_from(keys),
            Err(ShortcutError::DuplicateKey("A".to_string()))
        );
    }

    #[test]
    fn test_try_from_rejects_blank() {
        let keys = vec!["A".to_string(), "  ".to_string()];
        assert_eq!(Shortcut::try_from(keys), Err(ShortcutError::BlankKey));
    }

    #[test]
    #[should_panic(expected = "invalid shortcut")]
    fn test_new_panics_on_empty() {
        let _ = Shortcut::new(Vec::<String>::new());
    }

    #[test]
    fn test_satisfied_is_order_independent() {
        let shortcut = Shortcut::new(["A", "B"]);
        let pressed: HashSet<String> = ["B", "A"].iter().map(|k| k.to_string()).collect();
        assert!(shortcut.is_satisfied_by(&pressed));

        let partial: HashSet<String> = ["A", "C"].iter().map(|k| k.to_string()).collect();
        assert!(!shortcut.is_satisfied_by(&partial));
    }

    #[test]
    fn test_serialization_shape() {
        let shortcut = Shortcut::new(["LEFT CTRL", "LEFT ALT"]);
        let json = serde_json::to_string(&shortcut).unwrap();
        assert_eq!(json, r#"{"keys":["LEFT CTRL","LEFT ALT"]}"#);
    }

    #[test]
    fn test_deserialization_enforces_invariants() {
        assert!(serde_json::from_str::<Shortcut>(r#"{"keys":[]}"#).is_err());
        assert!(serde_json::from_str::<Shortcut>(r#"{"keys":["A",1]}"#).is_err());
        assert!(serde_json::from_str::<Shortcut>(r#"{"keys":"A"}"#).is_err());
        assert!(serde_json::from_str::<Shortcut>(r#"["A"]"#).is_err());

        let shortcut: Shortcut = serde_json::from_str(r#"{"keys":["B","A"]}"#).unwrap();
        assert_eq!(shortcut.keys(), &["B", "A"]);
    }
}
