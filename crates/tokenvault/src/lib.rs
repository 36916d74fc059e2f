//! TokenVault — capability tokens guarding a typed object store.
//!
//! Provides a registry of bearer tokens with revocable issuer privilege,
//! a file-backed store for images, videos and gifs, and the access gate
//! that composes the two. Both halves persist as JSON documents that are
//! rewritten on every mutation.

pub mod config;
pub mod document;
pub mod error;
pub mod gate;
pub mod ids;
pub mod objects;
pub mod registry;

// Re-export primary types
pub use config::Config;
pub use error::{Result, VaultError};
pub use gate::{Gate, TOKEN_HEADER};
pub use ids::{IdScheme, IdSource};
pub use registry::{Token, TokenId, TokenRegistry};

// Re-export object store types
pub use objects::{FileObject, FileType, ObjectStore, ObjectUid};
