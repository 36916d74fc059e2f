//! Type tags, uids, and on-disk descriptors of stored objects.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

// ── FileType ──────────────────────────────────────────────────────────────────

/// Media type tag, stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum FileType {
    /// Wire placeholder for unrecognised content. Never stored.
    Invalid = 0,
    Image = 1,
    Video = 2,
    Gif = 3,
}

impl FileType {
    /// The types an object can be stored under.
    pub const STORED: [FileType; 3] = [FileType::Image, FileType::Video, FileType::Gif];

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Classify an upload by its declared content type.
    ///
    /// Parameters such as `; charset=...` are ignored. Anything outside the
    /// accepted set maps to `Invalid`.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/png" => Self::Image,
            "image/gif" => Self::Gif,
            "video/mpeg" | "video/webm" => Self::Video,
            _ => Self::Invalid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Image => "image",
            Self::Video => "video",
            Self::Gif => "gif",
        }
    }
}

impl From<FileType> for u8 {
    fn from(kind: FileType) -> Self {
        kind.code()
    }
}

impl TryFrom<u8> for FileType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::Image),
            2 => Ok(Self::Video),
            3 => Ok(Self::Gif),
            other => Err(format!("unknown file type code: {other}")),
        }
    }
}

impl FromStr for FileType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "image" | "i" => Ok(Self::Image),
            "video" | "v" => Ok(Self::Video),
            "gif" | "g" => Ok(Self::Gif),
            other => Err(VaultError::InvalidInput(format!(
                "unknown object kind '{other}' (expected image, video, or gif)"
            ))),
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// ── ObjectUid ─────────────────────────────────────────────────────────────────

/// Unique id of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectUid(pub String);

impl ObjectUid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Parse an id as it appears in a download request, where clients may
    /// append a file extension: `1700000000123.png` → `1700000000123`.
    pub fn from_request(requested: &str) -> Self {
        let stem = match requested.rfind('.') {
            Some(i) => &requested[..i],
            None => requested,
        };
        Self(stem.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

// ── FileObject ────────────────────────────────────────────────────────────────

/// Listing entry describing where an object's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileObject {
    #[serde(rename = "file-uid")]
    pub uid: ObjectUid,
    /// Directory holding the object, one per type under the storage root.
    #[serde(rename = "path")]
    pub base_path: PathBuf,
    #[serde(rename = "file-type")]
    pub kind: FileType,
    /// Leaf name: the uid followed by the client-supplied name.
    pub filename: String,
}

impl FileObject {
    /// Build the descriptor for a new object under `storage_dir`.
    ///
    /// Only the final component of `client_name` is kept.
    ///
    /// # Errors
    ///
    /// `VaultError::InvalidInput` if `kind` is `Invalid` or `client_name` has
    /// no usable file name.
    pub fn new(
        uid: ObjectUid,
        storage_dir: &Path,
        kind: FileType,
        client_name: &str,
    ) -> Result<Self> {
        if kind == FileType::Invalid {
            return Err(VaultError::InvalidInput(
                "cannot store an object of invalid type".to_string(),
            ));
        }

        let name = Path::new(client_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                VaultError::InvalidInput(format!("unusable file name: {client_name:?}"))
            })?;

        Ok(Self {
            filename: format!("{}{}", uid.0, name),
            uid,
            base_path: type_dir(storage_dir, kind),
            kind,
        })
    }

    /// Full path of the object's bytes.
    pub fn path(&self) -> PathBuf {
        self.base_path.join(&self.filename)
    }

    /// Create or truncate the backing file and write `payload`.
    pub fn write_bytes(&self, payload: &[u8]) -> Result<()> {
        let file = File::create(self.path())?;
        let mut w = BufWriter::new(file);
        w.write_all(payload)?;
        w.flush()?;
        Ok(())
    }

    /// Stream the backing file into `out`, returning the byte count.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if the backing file is missing.
    pub fn read_into(&self, out: &mut dyn Write) -> Result<u64> {
        let path = self.path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(format!(
                    "object file missing: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(VaultError::Io(e)),
        };

        let mut r = BufReader::new(file);
        Ok(std::io::copy(&mut r, out)?)
    }
}

/// Directory for objects of `kind`: `{storage_dir}/{code}`.
pub fn type_dir(storage_dir: &Path, kind: FileType) -> PathBuf {
    storage_dir.join(kind.code().to_string())
}
