//! Asset sources.
//!
//! The server reads bytes through a [`Vfs`] trait object so tests and
//! tools can swap the disk out for an in-memory store. Implementations
//! must be `Send + Sync`; reads are issued from worker threads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use ember_core::alloc::HashMap;

use crate::error::{AssetError, AssetResult};

/// A byte source for assets and cache files.
pub trait Vfs: Send + Sync {
    fn read(&self, path: &Path) -> AssetResult<Vec<u8>>;
    fn write(&self, path: &Path, bytes: &[u8]) -> AssetResult<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Modification stamp of a file, or 0 if it does not exist.
    ///
    /// Stamps only need to change when the file changes; for the disk
    /// source this is seconds since the unix epoch.
    fn last_modified(&self, path: &Path) -> u64;
}

/// Reads from the filesystem, resolving relative paths against a base
/// directory.
pub struct DiskVfs {
    base: PathBuf,
}

impl DiskVfs {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

impl Vfs for DiskVfs {
    fn read(&self, path: &Path) -> AssetResult<Vec<u8>> {
        let full = self.resolve(path);
        fs::read(&full).map_err(|e| AssetError::from_io(full, e))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> AssetResult<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| AssetError::from_io(full.clone(), e))?;
        }
        fs::write(&full, bytes).map_err(|e| AssetError::from_io(full, e))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn last_modified(&self, path: &Path) -> u64 {
        let full = self.resolve(path);
        fs::metadata(&full)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// In-memory source for tests and embedded data.
///
/// Each write bumps the file's modification stamp, so cache staleness
/// checks behave the same as on disk.
#[derive(Default)]
pub struct MemoryVfs {
    files: Mutex<HashMap<PathBuf, (Vec<u8>, u64)>>,
}

impl MemoryVfs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap();
        let path = path.into();
        let stamp = files.get(&path).map(|(_, s)| s + 1).unwrap_or(1);
        files.insert(path, (bytes.into(), stamp));
    }

    pub fn remove(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }
}

impl Vfs for MemoryVfs {
    fn read(&self, path: &Path) -> AssetResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| AssetError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> AssetResult<()> {
        self.insert(path, bytes);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn last_modified(&self, path: &Path) -> u64 {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, stamp)| *stamp)
            .unwrap_or(0)
    }
}
