//! Crash-safe document writes.
//!
//! A write first lands in a temp file next to the destination, is flushed to
//! disk, and only then replaces the destination. A reader therefore sees either
//! the previous document or the new one, never a truncated mix.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use pixguard_types::PixguardError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

/// A fully written and synced temp file that has not replaced its destination yet.
///
/// Dropping it without [`StagedWrite::commit`] removes the temp file and leaves
/// the destination untouched.
#[derive(Debug)]
pub struct StagedWrite {
    target: PathBuf,
    temp: NamedTempFile,
}

impl StagedWrite {
    /// Write `bytes` to a temp file in the destination's directory and fsync it.
    ///
    /// # Errors
    /// Returns `Persist` if the directory cannot be created or the temp file
    /// cannot be written.
    pub fn stage(path: &Path, bytes: &[u8]) -> Result<Self, PixguardError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| PixguardError::persist(&dir, e))?;
        let prefix = path
            .file_name()
            .map_or_else(|| OsString::from(".tmp"), |n| {
                let mut p = OsString::from(".");
                p.push(n);
                p.push(".");
                p
            });
        let mut temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| PixguardError::persist(path, e))?;
        temp.write_all(bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| PixguardError::persist(temp.path(), e))?;
        Ok(Self {
            target: path.to_path_buf(),
            temp,
        })
    }

    /// Location of the staged temp file.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Replace the destination with the staged file.
    ///
    /// Falls back to moving the old destination aside and swapping when the
    /// platform refuses to rename over an existing file.
    ///
    /// # Errors
    /// Returns `Persist` if neither strategy succeeds; the previous destination
    /// is restored in that case.
    pub fn commit(self) -> Result<(), PixguardError> {
        match self.temp.persist(&self.target) {
            Ok(_) => Ok(()),
            Err(err) => backup_and_swap(err.file, &self.target),
        }
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".bak.tmp");
    PathBuf::from(name)
}

fn backup_and_swap(temp: NamedTempFile, target: &Path) -> Result<(), PixguardError> {
    let backup = backup_path(target);
    let had_target = target.exists();
    if had_target {
        let _ = fs::remove_file(&backup);
        fs::rename(target, &backup).map_err(|e| PixguardError::persist(target, e))?;
    }
    match temp.persist(target) {
        Ok(_) => {
            if had_target {
                let _ = fs::remove_file(&backup);
            }
            Ok(())
        }
        Err(err) => {
            if had_target {
                let _ = fs::rename(&backup, target);
            }
            Err(PixguardError::persist(target, err.error))
        }
    }
}

/// Atomically replace `path` with `bytes`.
///
/// # Errors
/// Returns `Persist` on any filesystem failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PixguardError> {
    StagedWrite::stage(path, bytes)?.commit()
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// # Errors
/// Returns `Data` if serialization fails and `Persist` on filesystem failure.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PixguardError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| PixguardError::Data(format!("serialize {}: {e}", path.display())))?;
    write_atomic(path, &bytes)
}

/// Read and parse a JSON document; a missing file yields `Ok(None)`.
///
/// # Errors
/// Returns `Persist` if the file exists but cannot be read and `Data` if it
/// does not parse.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PixguardError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PixguardError::persist(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PixguardError::Data(format!("parse {}: {e}", path.display())))
}
