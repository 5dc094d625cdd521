//! Filesystem adapter over Dropbox

pub mod dropboxfs;
pub mod handles;
pub mod info;

#[cfg(test)]
pub(crate) mod mock;

pub use dropboxfs::{DropboxFs, ListOptions};
pub use handles::{RemoteReader, SpooledWriter};
pub use info::Info;
