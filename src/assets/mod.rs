//! Asset helpers: key construction, upload, best-effort delete and blob
//! materialization on top of an [`ObjectStore`](crate::storage::ObjectStore).

pub mod blob;
pub mod deleter;
pub mod paths;
pub mod uploader;

pub use blob::{BlobConverter, BlobRegistry, DereferenceError};
pub use deleter::{DeleteOutcome, Deleter};
pub use paths::PathBuilder;
pub use uploader::{UploadError, Uploader};
