//! Dropbox exposed through a filesystem-style API
//!
//! [`DropboxFs`] maps path-based calls onto the Dropbox HTTP API and keeps
//! a TTL cache of metadata in front of it. Every mutation invalidates the
//! cache entries it can affect before returning.

pub mod cache;
pub mod config;
pub mod dropbox;
pub mod error;
pub mod fs;
pub mod path;

pub use cache::MetadataCache;
pub use config::FsConfig;
pub use dropbox::{DropboxClient, DropboxError, MetadataRecord, RemoteStore};
pub use error::FsError;
pub use fs::{DropboxFs, Info, ListOptions, RemoteReader, SpooledWriter};
