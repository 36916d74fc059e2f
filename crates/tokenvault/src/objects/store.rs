//! A listing document plus one directory per object type.
//!
//! ```text
//! {storage_dir}/
//! ├── 1/              — images
//! │   └── {uid}{name}
//! ├── 2/              — videos
//! └── 3/              — gifs
//! ```
//!
//! Listing document:
//! ```json
//! { "storage-dir": "...", "file-listing": { "<uid>": { ... FileObject ... } } }
//! ```
//!
//! Bytes are written before the listing. If the listing persist then fails
//! the listing is rolled back but the bytes stay on disk, unreferenced.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::document::{Document, Outcome};
use crate::error::{Result, VaultError};
use crate::ids::IdSource;

use super::object::{type_dir, FileObject, FileType, ObjectUid};

/// Draws attempted before giving up on finding an unused uid.
const MAX_UID_DRAWS: usize = 64;

/// Listing document contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(rename = "storage-dir")]
    pub storage_dir: PathBuf,
    #[serde(rename = "file-listing", default, deserialize_with = "null_as_empty")]
    pub files: BTreeMap<ObjectUid, FileObject>,
}

/// A `null` listing reads as an empty one.
fn null_as_empty<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<ObjectUid, FileObject>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

impl Listing {
    pub fn empty(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            files: BTreeMap::new(),
        }
    }
}

/// Filesystem-backed store of typed media objects.
#[derive(Debug)]
pub struct ObjectStore {
    doc: Document<Listing>,
    ids: Box<dyn IdSource>,
}

impl ObjectStore {
    /// Load the listing at `listing_path`, or start an empty one rooted at
    /// `storage_dir`. Creates the per-type directories if missing.
    ///
    /// An existing listing keeps its own storage root.
    pub fn open(
        listing_path: impl Into<PathBuf>,
        storage_dir: impl Into<PathBuf>,
        ids: Box<dyn IdSource>,
    ) -> Result<Self> {
        let storage_dir = storage_dir.into();
        let (doc, fresh) =
            Document::open_or_bootstrap(listing_path, || Listing::empty(&storage_dir))?;

        let root = doc.read().storage_dir.clone();
        if fresh {
            info!("started empty object listing at {}", doc.path().display());
        } else if root != storage_dir {
            warn!(
                "listing {} uses storage root {}, ignoring configured {}",
                doc.path().display(),
                root.display(),
                storage_dir.display()
            );
        }

        create_type_dirs(&root)?;
        Ok(Self { doc, ids })
    }

    /// Load an existing listing.
    pub fn load(listing_path: impl Into<PathBuf>, ids: Box<dyn IdSource>) -> Result<Self> {
        let doc = Document::<Listing>::load(listing_path)?;
        create_type_dirs(&doc.read().storage_dir)?;
        Ok(Self { doc, ids })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.doc = self.doc.with_retries(retries);
        self
    }

    pub fn listing_path(&self) -> &Path {
        self.doc.path()
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.doc.read().storage_dir.clone()
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Look up an object by exact uid, of any type.
    pub fn get_object(&self, uid: &ObjectUid) -> Option<FileObject> {
        self.doc.read().files.get(uid).cloned()
    }

    /// Look up an object that must be of type `kind`.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if the uid is unknown or stored under another
    /// type.
    pub fn fetch_typed(&self, uid: &ObjectUid, kind: FileType) -> Result<FileObject> {
        self.get_object(uid)
            .filter(|obj| obj.kind == kind)
            .ok_or_else(|| VaultError::NotFound(format!("no {kind} object with uid {uid}")))
    }

    /// Snapshot of every listed object, ordered by uid.
    pub fn list_objects(&self) -> Vec<FileObject> {
        self.doc.read().files.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.doc.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Allocate an unused uid and build a descriptor for it.
    ///
    /// The uid is not reserved; use [`ObjectStore::put`] when allocation and
    /// storage must not race with other uploads.
    pub fn describe(&self, kind: FileType, client_name: &str) -> Result<FileObject> {
        let listing = self.doc.read();
        let uid = self.draw_unused_uid(&listing)?;
        FileObject::new(uid, &listing.storage_dir, kind, client_name)
    }

    /// Write `payload` for `descriptor` and record it in the listing.
    ///
    /// Re-using a uid truncates the previous bytes and replaces the entry.
    ///
    /// # Errors
    ///
    /// `VaultError::InvalidInput` for an `Invalid` descriptor, `VaultError::Io`
    /// if the bytes cannot be written, or the listing persist error.
    pub fn store_object(&self, descriptor: &FileObject, payload: &[u8]) -> Result<()> {
        if descriptor.kind == FileType::Invalid {
            return Err(VaultError::InvalidInput(
                "cannot store an object of invalid type".to_string(),
            ));
        }

        self.doc.mutate(|listing| {
            descriptor.write_bytes(payload)?;
            listing
                .files
                .insert(descriptor.uid.clone(), descriptor.clone());
            Ok(Outcome::Changed(()))
        })?;

        info!(
            "stored {} object {} ({} bytes)",
            descriptor.kind,
            descriptor.uid,
            payload.len()
        );
        Ok(())
    }

    /// Allocate a uid, write `payload`, and list it, all under one lock.
    pub fn put(&self, kind: FileType, client_name: &str, payload: &[u8]) -> Result<FileObject> {
        let obj = self.doc.mutate(|listing| {
            let uid = self.draw_unused_uid(listing)?;
            let obj = FileObject::new(uid, &listing.storage_dir, kind, client_name)?;
            obj.write_bytes(payload)?;
            listing.files.insert(obj.uid.clone(), obj.clone());
            Ok(Outcome::Changed(obj))
        })?;

        info!("stored {} object {} ({} bytes)", obj.kind, obj.uid, payload.len());
        Ok(obj)
    }

    /// Stream the bytes of `descriptor` into `out`.
    ///
    /// # Errors
    ///
    /// `VaultError::NotFound` if the backing file is missing.
    pub fn read_object(&self, descriptor: &FileObject, out: &mut dyn Write) -> Result<u64> {
        let _listing = self.doc.read();
        descriptor.read_into(out)
    }

    fn draw_unused_uid(&self, listing: &Listing) -> Result<ObjectUid> {
        for _ in 0..MAX_UID_DRAWS {
            let uid = ObjectUid(self.ids.next_id());
            if !listing.files.contains_key(&uid) {
                return Ok(uid);
            }
        }
        Err(VaultError::InvariantViolation(format!(
            "no unused object uid after {MAX_UID_DRAWS} draws"
        )))
    }
}

fn create_type_dirs(storage_dir: &Path) -> Result<()> {
    for kind in FileType::STORED {
        std::fs::create_dir_all(type_dir(storage_dir, kind))?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
