//! Durable key-value slots for persisting a security module's configuration.

use crate::fsutil::{remove_if_exists, replace_file};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use zeroize::Zeroizing;

/// One durable slot holding an opaque configuration payload.
///
/// Every call is synchronous and must have completed (or failed) when it returns.
pub trait ConfigStore: Send + Sync {
    /// Whether a payload is stored.
    fn exists(&self) -> io::Result<bool>;

    /// Load the stored payload.
    fn load(&self) -> io::Result<Vec<u8>>;

    /// Replace the stored payload.
    fn store(&self, buf: &[u8]) -> io::Result<()>;

    /// Remove the stored payload (succeeds if nothing is stored).
    fn delete(&self) -> io::Result<()>;
}

impl<T: ConfigStore + ?Sized> ConfigStore for Box<T> {
    fn exists(&self) -> io::Result<bool> {
        (**self).exists()
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        (**self).load()
    }

    fn store(&self, buf: &[u8]) -> io::Result<()> {
        (**self).store(buf)
    }

    fn delete(&self) -> io::Result<()> {
        (**self).delete()
    }
}

/// In-memory store. Clones share the same slot.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<Zeroizing<Vec<u8>>>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Zeroizing<Vec<u8>>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl ConfigStore for MemoryStore {
    fn exists(&self) -> io::Result<bool> {
        Ok(self.slot().is_some())
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        match self.slot().as_ref() {
            Some(buf) => Ok(buf.to_vec()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no configuration stored",
            )),
        }
    }

    fn store(&self, buf: &[u8]) -> io::Result<()> {
        *self.slot() = Some(Zeroizing::new(buf.to_vec()));
        Ok(())
    }

    fn delete(&self) -> io::Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

/// Stores the payload in a single file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// A store backed by `path` (the file need not exist yet).
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileStore {
    fn exists(&self) -> io::Result<bool> {
        self.path.try_exists()
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    fn store(&self, buf: &[u8]) -> io::Result<()> {
        replace_file(&self.path, buf)
    }

    fn delete(&self) -> io::Result<()> {
        remove_if_exists(&self.path)
    }
}
