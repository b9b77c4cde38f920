//! JSON snapshot persistence for TradeMinutes state.
//!
//! A [`JsonStore`] owns one file, `<state_dir>/<name>.json`, and reads or
//! replaces it wholesale. Writes go to a sibling temp file first and are then
//! renamed into place, so a crash mid-write never leaves a truncated snapshot.

#![forbid(unsafe_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// A single JSON snapshot file.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Create a store for `<state_dir>/<name>.json`.
    ///
    /// The directory is created lazily on first save.
    pub fn new(state_dir: &Path, name: &str) -> Self {
        Self {
            path: state_dir.join(format!("{name}.json")),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, falling back to `T::default()` when the file is
    /// missing or unreadable.
    pub fn load<T>(&self) -> T
    where
        T: DeserializeOwned + Default,
    {
        match self.try_load() {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable snapshot");
                T::default()
            }
        }
    }

    /// Load the snapshot, distinguishing "absent" from "corrupt".
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn try_load<T>(&self) -> io::Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let value = serde_json::from_slice(&bytes).map_err(io::Error::other)?;
        Ok(Some(value))
    }

    /// Atomically replace the snapshot with `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn save<T>(&self, value: &T) -> io::Result<()>
    where
        T: Serialize + ?Sized,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "snapshot written");
        Ok(())
    }
}
