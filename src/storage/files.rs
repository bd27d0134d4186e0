use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::EntryStore;
use super::models::ClipboardEntry;
use crate::config::ENTRY_EXTENSION;
use crate::errors::{ClipError, Result};

/// One JSON file per entry, named `<timestamp>.json`.
pub struct FileStore {
    dir: PathBuf,
}

/// Writes `contents` next to `path` and renames it into place.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    fs::write(&tmp, contents)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Parses `<digits>.json`; anything else (tag file, temp files) is not an entry.
fn parse_entry_name(name: &str) -> Option<i64> {
    let stem = name.strip_suffix(ENTRY_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

impl FileStore {
    /// Creates the directory if it does not exist yet.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{id}.{ENTRY_EXTENSION}"))
    }
}

impl EntryStore for FileStore {
    fn save(&self, entry: &ClipboardEntry) -> Result<()> {
        let json = serde_json::to_vec(entry)?;
        write_atomic(&self.entry_path(entry.timestamp), &json)?;
        debug!(id = entry.timestamp, "saved entry");
        Ok(())
    }

    fn load(&self, id: i64) -> Result<ClipboardEntry> {
        let raw = match fs::read(self.entry_path(id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ClipError::NotFound(format!("Entry {id} not found")));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|e| ClipError::Corrupt(format!("Entry {id}: {e}")))
    }

    fn delete(&self, id: i64) -> Result<bool> {
        match fs::remove_file(self.entry_path(id)) {
            Ok(()) => {
                debug!(id, "deleted entry");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            if let Some(id) = dirent.file_name().to_str().and_then(parse_entry_name) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
