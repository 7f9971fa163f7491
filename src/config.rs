//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::engine::CaptureConfig;

const SHORTCUT_PATH_VAR: &str = "MUTEMIC_SHORTCUT_PATH";
const SOCKET_PATH_VAR: &str = "MUTEMIC_SOCKET_PATH";
const FINISH_AFTER_VAR: &str = "MUTEMIC_FINISH_AFTER_MS";
const FAIL_DELAY_VAR: &str = "MUTEMIC_FAIL_DELAY_MS";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Path of the persisted shortcut record
    pub shortcut_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Default timings for capture sessions
    pub capture: CaptureConfig,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("mutemic");

        let shortcut_path = lookup(SHORTCUT_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("shortcut.json"));
        let socket_path = lookup(SOCKET_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let defaults = CaptureConfig::default();
        let capture = CaptureConfig {
            finish_after_key_down: millis_var(&lookup, FINISH_AFTER_VAR)?
                .unwrap_or(defaults.finish_after_key_down),
            fail_delay: millis_var(&lookup, FAIL_DELAY_VAR)?.unwrap_or(defaults.fail_delay),
        };

        Ok(Self {
            socket_path,
            shortcut_path,
            data_dir,
            capture,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn millis_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let ms: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of milliseconds, got '{raw}'"))?;
    Ok(Some(Duration::from_millis(ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(&[("HOME", "/home/user")])).unwrap();
        assert_eq!(
            config.shortcut_path,
            PathBuf::from("/home/user/.local/share/mutemic/shortcut.json")
        );
        assert!(config.socket_path.to_string_lossy().contains("mutemic"));
        assert_eq!(config.capture, CaptureConfig::default());
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("HOME", "/home/user"),
            (SHORTCUT_PATH_VAR, "/tmp/custom.json"),
            (FINISH_AFTER_VAR, "250"),
            (FAIL_DELAY_VAR, " 3000 "),
        ]))
        .unwrap();

        assert_eq!(config.shortcut_path, PathBuf::from("/tmp/custom.json"));
        assert_eq!(config.capture.finish_after_key_down, Duration::from_millis(250));
        assert_eq!(config.capture.fail_delay, Duration::from_millis(3000));
    }

    #[test]
    fn test_config_rejects_bad_timing() {
        let err = Config::from_lookup(lookup_from(&[
            ("HOME", "/home/user"),
            (FAIL_DELAY_VAR, "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(FAIL_DELAY_VAR));
    }

    #[test]
    fn test_config_requires_home() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
    }
}
