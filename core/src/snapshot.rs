//! Snapshot files: full state to and from a JSON document on a volume.
//!
//! A snapshot is written to `<name>.tmp` and renamed over `<name>`, so a
//! crash mid-write leaves the previous document intact. Without a volume
//! directory every operation is a no-op.

use crate::error::ParkResult;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const PARK_SNAPSHOT_FILE: &str = "state.json";

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: Option<PathBuf>,
}

impl SnapshotFile {
    /// `volume = None` keeps state in memory only.
    pub fn new(volume: Option<&Path>, file_name: &str) -> Self {
        Self {
            path: volume.map(|dir| dir.join(file_name)),
        }
    }

    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// `Ok(None)` when there is no volume or no file yet. Any other read
    /// or parse failure is an error.
    pub fn load<T: DeserializeOwned>(&self) -> ParkResult<Option<T>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save<T: Serialize>(&self, value: &T) -> ParkResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(value)?;
        let tmp = tmp_path(path);
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
