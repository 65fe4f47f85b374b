//! Reading and atomically writing sources by key.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;

use crate::error::{CalGridError, CalGridResult};
use crate::event::OriginKey;

/// Where source text comes from and goes back to.
pub trait SourceIo: Send + Sync {
    fn read(&self, key: &OriginKey) -> CalGridResult<String>;

    /// Replace the source behind `key` with `text` in one step.
    ///
    /// On error the previous content must still be intact.
    fn write_atomic(&self, key: &OriginKey, text: &str) -> CalGridResult<()>;
}

/// Origin keys are file paths. `~` is expanded; relative paths resolve
/// against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FsSourceIo {
    root: Option<PathBuf>,
}

impl FsSourceIo {
    pub fn new() -> Self {
        FsSourceIo { root: None }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        FsSourceIo {
            root: Some(root.into()),
        }
    }

    pub fn path(&self, key: &OriginKey) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(key.as_str()).into_owned());
        match &self.root {
            Some(root) if expanded.is_relative() => root.join(expanded),
            _ => expanded,
        }
    }
}

impl SourceIo for FsSourceIo {
    fn read(&self, key: &OriginKey) -> CalGridResult<String> {
        std::fs::read_to_string(self.path(key)).map_err(|e| CalGridError::io(key, e))
    }

    fn write_atomic(&self, key: &OriginKey, text: &str) -> CalGridResult<()> {
        let path = self.path(key);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // Temp file in the same directory so the rename never crosses filesystems.
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| CalGridError::io(key, e))?;
        temp.write_all(text.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| CalGridError::io(key, e))?;

        if let Ok(meta) = std::fs::metadata(&path) {
            temp.as_file()
                .set_permissions(meta.permissions())
                .map_err(|e| CalGridError::io(key, e))?;
        }

        temp.persist(&path).map_err(|e| CalGridError::io(key, e.error))?;
        Ok(())
    }
}

/// Sources held in memory. Handy for embedding and for tests.
#[derive(Debug, Default)]
pub struct MemorySourceIo {
    files: Mutex<BTreeMap<OriginKey, String>>,
    read_only: Mutex<BTreeSet<OriginKey>>,
}

impl MemorySourceIo {
    pub fn new() -> Self {
        MemorySourceIo::default()
    }

    pub fn insert(&self, key: impl Into<OriginKey>, text: impl Into<String>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), text.into());
    }

    pub fn get(&self, key: &OriginKey) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Make every later write to `key` fail with a permission error.
    pub fn set_read_only(&self, key: impl Into<OriginKey>) {
        self.read_only
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into());
    }
}

impl SourceIo for MemorySourceIo {
    fn read(&self, key: &OriginKey) -> CalGridResult<String> {
        self.get(key).ok_or_else(|| {
            CalGridError::io(key, io::Error::new(io::ErrorKind::NotFound, "no such source"))
        })
    }

    fn write_atomic(&self, key: &OriginKey, text: &str) -> CalGridResult<()> {
        let read_only = self
            .read_only
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key);
        if read_only {
            return Err(CalGridError::io(
                key,
                io::Error::new(io::ErrorKind::PermissionDenied, "source is read-only"),
            ));
        }
        self.insert(key.clone(), text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let io = FsSourceIo::with_root(dir.path());
        let key = OriginKey::new("cal.ics");
        std::fs::write(dir.path().join("cal.ics"), "old").unwrap();

        io.write_atomic(&key, "new").unwrap();

        assert_eq!(io.read(&key).unwrap(), "new");
        // Only the target remains; the temp file was renamed over it.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_fs_read_missing_reports_key() {
        let dir = tempfile::tempdir().unwrap();
        let io = FsSourceIo::with_root(dir.path());
        let err = io.read(&"missing.ics".into()).unwrap_err();
        assert!(matches!(err, CalGridError::Io { ref key, .. } if key.as_str() == "missing.ics"));
    }

    #[test]
    fn test_fs_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let io = FsSourceIo::with_root(dir.path());
        assert!(io.write_atomic(&"nope/cal.ics".into(), "x").is_err());
    }

    #[test]
    fn test_absolute_keys_ignore_root() {
        let io = FsSourceIo::with_root("/somewhere");
        assert_eq!(io.path(&"/abs/cal.ics".into()), PathBuf::from("/abs/cal.ics"));
        assert_eq!(io.path(&"rel.ics".into()), PathBuf::from("/somewhere/rel.ics"));
    }

    #[test]
    fn test_memory_read_only() {
        let io = MemorySourceIo::new();
        io.insert("a.ics", "text");
        io.set_read_only("a.ics");

        assert!(io.write_atomic(&"a.ics".into(), "changed").is_err());
        assert_eq!(io.read(&"a.ics".into()).unwrap(), "text");
    }
}
