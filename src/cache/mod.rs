//! Metadata caching layer
//!
//! Caches Dropbox metadata records and folder listings in Moka with a
//! configurable TTL, so repeated lookups skip the `get_metadata` and
//! `list_folder` round trips.

pub mod metadata;

pub use metadata::MetadataCache;
