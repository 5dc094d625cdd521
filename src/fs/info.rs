//! Info view returned by `DropboxFs::info`

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::dropbox::MetadataRecord;

/// File or folder information, as exposed to filesystem callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Info {
    /// Last path component
    pub name: String,
    /// Absolute path with display casing
    pub path: String,
    /// Size in bytes (0 for folders)
    pub size: u64,
    pub is_dir: bool,
    pub is_file: bool,
    /// Server modification time (files only)
    pub modified: Option<DateTime<Utc>>,
    pub rev: Option<String>,
    pub content_hash: Option<String>,
}

impl Info {
    /// Modification time in the local timezone
    pub fn modified_local(&self) -> Option<DateTime<Local>> {
        self.modified.map(|t| t.with_timezone(&Local))
    }
}

impl From<MetadataRecord> for Info {
    fn from(record: MetadataRecord) -> Self {
        Self {
            name: record.name,
            path: record.path,
            size: record.size,
            is_dir: record.is_directory,
            is_file: !record.is_directory,
            modified: record.modified,
            rev: record.rev,
            content_hash: record.content_hash,
        }
    }
}
