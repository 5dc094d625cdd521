//! Dropbox API client

pub mod client;
pub mod errors;
pub mod hash;
pub mod store;
pub mod types;

pub use client::DropboxClient;
pub use errors::DropboxError;
pub use store::RemoteStore;
pub use types::*;
