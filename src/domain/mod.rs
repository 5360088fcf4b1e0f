//! Domain types and models

mod asset;

pub use asset::{
    AssetCategory, DownloadUrl, StorageKey, UploadableFile, UploadedAsset, DEFAULT_IMAGE_MIME,
};
