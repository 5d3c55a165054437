use crate::event;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use strum_macros::Display;

#[derive(Debug, Display)]
pub enum StoreError {
    InvalidKey(String),
    Io(std::io::Error),
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self { StoreError::Io(value) }
}

/// Opaque byte store: one file per key below a host-supplied root directory.
#[derive(Debug, Clone)]
pub struct MissionStore {
    root: PathBuf,
}

impl MissionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    fn path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if valid { Ok(self.root.join(key)) } else { Err(StoreError::InvalidKey(key.to_string())) }
    }

    /// Bytes stored under `key`, `None` if nothing was written yet.
    pub fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(self.path(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces the value of `key`. The new value becomes visible at once or not at all.
    pub fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path(key)?;
        std::fs::create_dir_all(&self.root)?;
        let staging = self.root.join(format!(".{key}.tmp"));
        std::fs::write(&staging, bytes)?;
        std::fs::rename(&staging, &path)?;
        event!("Stored {} bytes under {}", bytes.len(), path.display());
        Ok(())
    }
}
