//! Patient record persistence with file locking.
//!
//! The patient record owns the care protocol; protocol edit operations are
//! applied through `Patient::update` so every change is persisted
//! atomically. There is no module-level singleton - callers pass the
//! loaded record around explicitly.

use crate::protocol::build_default_protocol;
use crate::types::CareProtocol;
use crate::{Error, Result};
use chrono::NaiveDate;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// The persistent patient record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Patient {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub born_on: Option<NaiveDate>,
    pub protocol: CareProtocol,
}

impl Default for Patient {
    fn default() -> Self {
        Self {
            name: String::new(),
            born_on: None,
            protocol: build_default_protocol(),
        }
    }
}

impl Patient {
    /// Load the patient record from a file with shared locking
    ///
    /// Returns the default record if the file doesn't exist.
    /// If the file is corrupted, logs a warning and returns the default.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No patient file found, using default record");
            return Ok(Self::default());
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(
                    "Unable to open patient file {:?}: {}. Using defaults.",
                    path,
                    e
                );
                return Ok(Self::default());
            }
        };

        // Acquire shared lock for reading
        if let Err(e) = file.lock_shared() {
            tracing::warn!(
                "Unable to lock patient file {:?}: {}. Using defaults.",
                path,
                e
            );
            return Ok(Self::default());
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!(
                "Failed to read patient file {:?}: {}. Using defaults.",
                path,
                e
            );
            return Ok(Self::default());
        }

        file.unlock()?;

        match serde_json::from_str::<Patient>(&contents) {
            Ok(patient) => {
                tracing::debug!("Loaded patient record from {:?}", path);
                Ok(patient)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse patient file {:?}: {}. Using defaults.",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Save the patient record to a file with exclusive locking
    ///
    /// Atomically writes the record by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Create unique temp file in the same directory for atomic rename
        let temp = NamedTempFile::new_in(path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "patient path missing parent")
        })?)?;

        // Acquire exclusive lock on the temp file to serialize concurrent writers
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        // Atomically replace old patient file
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved patient record to {:?}", path);
        Ok(())
    }

    /// Load the record, modify it, and save it back atomically
    ///
    /// This is the entry point for protocol edit operations: every change
    /// goes through load-modify-save.
    pub fn update<F>(path: &Path, f: F) -> Result<Self>
    where
        F: FnOnce(&mut Patient) -> Result<()>,
    {
        let mut patient = Self::load(path)?;
        f(&mut patient)?;
        patient.save(path)?;
        Ok(patient)
    }
}
