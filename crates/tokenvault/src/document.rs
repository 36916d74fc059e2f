//! Persistent JSON documents with write-through and rollback.
//!
//! Both the token registry and the object store keep their whole state in a
//! single JSON document. The in-memory copy lives behind a reader/writer
//! lock; every mutation runs under the write lock as:
//!
//! ```text
//! snapshot → apply → persist ──ok──→ done
//!                       └──err──→ restore snapshot, return error
//! ```
//!
//! so the in-memory value always equals what was last durably written.
//! Writes replace the file through a sibling `*.tmp` file and a rename, so a
//! reader never sees a torn document.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, VaultError};

/// Result of a mutation closure passed to [`Document::mutate`].
///
/// `Unchanged` skips the persist step entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    Changed(R),
    Unchanged(R),
}

/// Read and deserialize the document at `path`.
///
/// # Errors
///
/// Returns `VaultError::NotFound` if no file exists at `path`,
/// `VaultError::Corrupt` if it does not parse as `T`, or `VaultError::Io`
/// for any other read failure.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VaultError::NotFound(format!(
                "document not found: {}",
                path.display()
            )));
        }
        Err(e) => return Err(VaultError::Io(e)),
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        VaultError::Corrupt(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Serialize `value` and replace the file at `path` with it.
///
/// The parent directory must already exist.
pub fn persist<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| VaultError::Serialization(e.to_string()))?;
    write_atomic(path, &json)
}

/// Write `default` as the initial document at `path` and return it.
///
/// Creates the parent directory if it does not exist.
pub fn bootstrap<T: Serialize>(path: &Path, default: T) -> Result<T> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    persist(path, &default)?;
    info!("bootstrapped new document at {}", path.display());
    Ok(default)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = tmp_path_for(path);
    std::fs::write(&tmp_path, data)?;

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(VaultError::Io(e));
    }

    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ── Document ──────────────────────────────────────────────────────────────────

/// An in-memory value kept in lock-step with a JSON file on disk.
#[derive(Debug)]
pub struct Document<T> {
    path: PathBuf,
    state: RwLock<T>,
    retries: u32,
}

impl<T> Document<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Load an existing document.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let value = load(&path)?;
        info!("loaded document from {}", path.display());
        Ok(Self::from_parts(path, value))
    }

    /// Write `default` to `path` and wrap it.
    pub fn bootstrap(path: impl Into<PathBuf>, default: T) -> Result<Self> {
        let path = path.into();
        let value = bootstrap(&path, default)?;
        Ok(Self::from_parts(path, value))
    }

    /// Load the document at `path`, or bootstrap it from `default` when no
    /// file exists yet. A corrupt document is an error, never overwritten.
    ///
    /// The returned flag is `true` when the document was bootstrapped.
    pub fn open_or_bootstrap(
        path: impl Into<PathBuf>,
        default: impl FnOnce() -> T,
    ) -> Result<(Self, bool)> {
        let path = path.into();
        match Self::load(&path) {
            Ok(doc) => Ok((doc, false)),
            Err(VaultError::NotFound(_)) => Ok((Self::bootstrap(path, default())?, true)),
            Err(e) => Err(e),
        }
    }

    /// Retry a failed persist up to `retries` extra times before rolling back.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    fn from_parts(path: PathBuf, value: T) -> Self {
        Self {
            path,
            state: RwLock::new(value),
            retries: 0,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared read access. Blocks while a mutation is in flight.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.state.read()
    }

    /// Clone of the current value.
    pub fn snapshot(&self) -> T {
        self.state.read().clone()
    }

    /// Apply `f` under the write lock, then persist.
    ///
    /// If `f` fails, or the persist fails after all retries, the value is
    /// restored to exactly what it was before `f` ran and the error is
    /// returned.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> Result<Outcome<R>>) -> Result<R> {
        let mut state = self.state.write();
        let before = state.clone();

        let out = match f(&mut state) {
            Ok(Outcome::Unchanged(out)) => return Ok(out),
            Ok(Outcome::Changed(out)) => out,
            Err(e) => {
                *state = before;
                return Err(e);
            }
        };

        if let Err(e) = self.persist_with_retries(&state) {
            warn!(
                "persist of {} failed, rolled back in-memory state: {e}",
                self.path.display()
            );
            *state = before;
            return Err(e);
        }

        Ok(out)
    }

    fn persist_with_retries(&self, value: &T) -> Result<()> {
        let mut attempt = 0;
        loop {
            match persist(&self.path, value) {
                Ok(()) => {
                    debug!("persisted {}", self.path.display());
                    return Ok(());
                }
                Err(VaultError::Io(e)) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "persist of {} failed (attempt {attempt}/{}): {e}",
                        self.path.display(),
                        self.retries + 1
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
