//! Persistence of the committed shortcut
//!
//! The store owns the single "current" shortcut. It is replaced only after
//! a write to disk has succeeded, so readers never observe a shortcut that
//! is not also on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::chord::Shortcut;

/// Errors that can occur while persisting a shortcut
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write shortcut file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize shortcut: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a stored record was rejected on load
#[derive(Debug)]
enum LoadFailure {
    Read(io::Error),
    Malformed(serde_json::Error),
}

impl std::fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadFailure::Read(e) => write!(f, "read failed: {}", e),
            LoadFailure::Malformed(e) => write!(f, "malformed record: {}", e),
        }
    }
}

/// Loads and saves the shortcut record at a fixed path
#[derive(Debug)]
pub struct ShortcutStore {
    path: PathBuf,
    current: Shortcut,
}

impl ShortcutStore {
    /// Load the stored shortcut, falling back to the default.
    ///
    /// A missing, unreadable or malformed record is replaced by the default
    /// shortcut, which is written back immediately. This never fails: if the
    /// repair write fails too, the default is still used in memory.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        match read_record(&path) {
            Ok(shortcut) => {
                info!(?path, shortcut = %shortcut, "shortcut loaded");
                return Self {
                    path,
                    current: shortcut,
                };
            }
            Err(LoadFailure::Read(e)) if e.kind() == io::ErrorKind::NotFound => {
                info!(?path, "no stored shortcut, using default");
            }
            Err(failure) => {
                warn!(?path, %failure, "stored shortcut rejected, using default");
            }
        }

        let current = Shortcut::default_shortcut();
        if let Err(e) = write_record(&path, &current) {
            warn!(?e, "failed to repair shortcut file");
        }

        Self { path, current }
    }

    /// The committed shortcut
    pub fn current(&self) -> &Shortcut {
        &self.current
    }

    /// Location of the record on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `shortcut` and make it current.
    ///
    /// On failure the previous shortcut stays current.
    pub fn save(&mut self, shortcut: Shortcut) -> Result<(), StoreError> {
        write_record(&self.path, &shortcut)?;

        info!(
            from = %self.current,
            to = %shortcut,
            "shortcut saved"
        );
        self.current = shortcut;

        Ok(())
    }
}

fn read_record(path: &Path) -> Result<Shortcut, LoadFailure> {
    let content = fs::read_to_string(path).map_err(LoadFailure::Read)?;
    serde_json::from_str(&content).map_err(LoadFailure::Malformed)
}

/// Write through a sibling temp file so a failed write never truncates the record
fn write_record(path: &Path, shortcut: &Shortcut) -> Result<(), StoreError> {
    let io_err = |source: io::Error| StoreError::Io {
        path: path.to_owned(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let content = serde_json::to_string_pretty(shortcut)?;
    let tmp_path = path.with_extension("json.tmp");

    fs::write(&tmp_path, content).map_err(io_err)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_err(e));
    }

    debug!(?path, "shortcut record written");
    Ok(())
}
