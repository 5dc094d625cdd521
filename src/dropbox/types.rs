//! Dropbox API types and MetadataRecord conversion
//!
//! Defines types for Dropbox API v2 responses and conversion to the
//! metadata records held by the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// File metadata as returned by Dropbox
#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    /// Last path component, with original casing
    pub name: String,
    /// Full path with original casing (absent for unmounted shared files)
    #[serde(default)]
    pub path_display: Option<String>,
    /// Lower-cased full path
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// File size in bytes
    pub size: u64,
    /// Unique identifier for the current revision
    pub rev: String,
    /// Last time the file was modified on Dropbox
    pub server_modified: DateTime<Utc>,
    /// Dropbox content hash (SHA-256 block hash, hex)
    #[serde(default)]
    pub content_hash: Option<String>,
}

/// Folder metadata as returned by Dropbox
#[derive(Debug, Clone, Deserialize)]
pub struct FolderMetadata {
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Marker for an entry that was deleted
#[derive(Debug, Clone, Deserialize)]
pub struct DeletedMetadata {
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
}

/// Tagged metadata union (`.tag` = file, folder or deleted)
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
pub enum Metadata {
    File(FileMetadata),
    Folder(FolderMetadata),
    Deleted(DeletedMetadata),
}

/// Result of `files/list_folder` and `files/list_folder/continue`
#[derive(Debug, Deserialize)]
pub struct ListFolderResult {
    pub entries: Vec<Metadata>,
    pub cursor: String,
    pub has_more: bool,
}

/// Result of mutating calls that return tagged metadata
/// (`delete_v2`, `move_v2`, `copy_v2`)
#[derive(Debug, Deserialize)]
pub struct RelocationResult {
    pub metadata: Metadata,
}

/// Result of `files/create_folder_v2` (untagged folder metadata)
#[derive(Debug, Deserialize)]
pub struct CreateFolderResult {
    pub metadata: FolderMetadata,
}

/// Argument for calls taking a single path
#[derive(Debug, Serialize)]
pub struct PathArg<'a> {
    pub path: &'a str,
}

/// Request body for `files/list_folder`
#[derive(Debug, Serialize)]
pub struct ListFolderArg<'a> {
    pub path: &'a str,
    pub recursive: bool,
    pub include_deleted: bool,
    pub limit: u32,
}

/// Request body for `files/get_metadata`
#[derive(Debug, Serialize)]
pub struct GetMetadataArg<'a> {
    pub path: &'a str,
    pub include_deleted: bool,
}

/// Request body for `files/move_v2` and `files/copy_v2`
#[derive(Debug, Serialize)]
pub struct RelocationArg<'a> {
    pub from_path: &'a str,
    pub to_path: &'a str,
    pub autorename: bool,
}

/// `Dropbox-API-Arg` for `files/upload`
#[derive(Debug, Serialize)]
pub struct UploadArg<'a> {
    pub path: &'a str,
    pub mode: &'static str,
    pub autorename: bool,
    pub mute: bool,
}

/// Metadata for one remote object, as cached by the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    /// Absolute path with display casing
    pub path: String,
    /// Last path component ("/" for the root)
    pub name: String,
    /// Size in bytes (0 for folders)
    pub size: u64,
    pub is_directory: bool,
    /// Revision identifier (files only)
    pub rev: Option<String>,
    /// Dropbox content hash (files only)
    pub content_hash: Option<String>,
    /// Server modification time (files only)
    pub modified: Option<DateTime<Utc>>,
    /// When this record was fetched from Dropbox
    pub fetched_at: SystemTime,
}

impl MetadataRecord {
    /// Synthesized record for the account root, which `get_metadata` rejects
    pub fn root() -> Self {
        Self {
            path: "/".to_string(),
            name: "/".to_string(),
            size: 0,
            is_directory: true,
            rev: None,
            content_hash: None,
            modified: None,
            fetched_at: SystemTime::now(),
        }
    }

    /// Convert a file metadata entry
    pub fn from_file(file: FileMetadata, requested: &str) -> Self {
        Self {
            path: file.path_display.unwrap_or_else(|| requested.to_string()),
            name: file.name,
            size: file.size,
            is_directory: false,
            rev: Some(file.rev),
            content_hash: file.content_hash,
            modified: Some(file.server_modified),
            fetched_at: SystemTime::now(),
        }
    }

    /// Convert a folder metadata entry
    pub fn from_folder(folder: FolderMetadata, requested: &str) -> Self {
        Self {
            path: folder.path_display.unwrap_or_else(|| requested.to_string()),
            name: folder.name,
            size: 0,
            is_directory: true,
            rev: None,
            content_hash: None,
            modified: None,
            fetched_at: SystemTime::now(),
        }
    }

    /// Convert tagged metadata; deleted entries yield `None`
    pub fn from_metadata(metadata: Metadata, requested: &str) -> Option<Self> {
        match metadata {
            Metadata::File(f) => Some(Self::from_file(f, requested)),
            Metadata::Folder(f) => Some(Self::from_folder(f, requested)),
            Metadata::Deleted(_) => None,
        }
    }
}
