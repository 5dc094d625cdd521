//! Remote store abstraction
//!
//! The filesystem adapter talks to Dropbox only through this trait, so the
//! cache and invalidation logic can be exercised against an in-memory store.

use async_trait::async_trait;

use super::errors::DropboxError;
use super::types::MetadataRecord;

/// Remote metadata and content operations used by `DropboxFs`
///
/// Paths are normalized absolute paths (`/` is the account root).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch metadata for one path; deleted or missing paths are `NotFound`
    async fn fetch_metadata(&self, path: &str) -> Result<MetadataRecord, DropboxError>;

    /// List the immediate children of a folder
    async fn list_directory(&self, path: &str) -> Result<Vec<MetadataRecord>, DropboxError>;

    /// Download file content, optionally limited to an inclusive byte range
    async fn download(&self, path: &str, range: Option<(u64, u64)>) -> Result<Vec<u8>, DropboxError>;

    /// Upload file content, overwriting any existing file
    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<MetadataRecord, DropboxError>;

    /// Delete a file or folder (folders are deleted recursively)
    async fn remove(&self, path: &str) -> Result<(), DropboxError>;

    /// Move a file or folder
    async fn move_entry(&self, from: &str, to: &str) -> Result<MetadataRecord, DropboxError>;

    /// Copy a file or folder
    async fn copy_entry(&self, from: &str, to: &str) -> Result<MetadataRecord, DropboxError>;

    /// Create a folder
    async fn create_folder(&self, path: &str) -> Result<MetadataRecord, DropboxError>;
}
