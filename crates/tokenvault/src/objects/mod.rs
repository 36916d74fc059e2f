//! Typed object store — uploaded media partitioned by type.

pub mod object;
pub mod store;

pub use object::{type_dir, FileObject, FileType, ObjectUid};
pub use store::{Listing, ObjectStore};
