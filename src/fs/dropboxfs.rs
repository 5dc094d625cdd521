//! Dropbox filesystem adapter
//!
//! Exposes a Dropbox account through filesystem-style calls. Metadata reads
//! go through [`MetadataCache`]; every mutating call goes through
//! `DropboxFs::mutate`, which registers the affected paths, invalidates
//! them, performs the remote call and invalidates them again before the
//! result is returned.
//!
//! A metadata fetch that overlaps a mutation of the same path is returned to
//! its caller but never stored: fetches note the mutation generation before
//! they start and only store their result if no mutation finished meanwhile
//! and none is still running on that path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::handles::{RemoteReader, SpooledWriter};
use super::info::Info;
use crate::cache::MetadataCache;
use crate::config::FsConfig;
use crate::dropbox::{DropboxClient, DropboxError, MetadataRecord, RemoteStore};
use crate::error::FsError;
use crate::path::{self, cache_key, normalize};

/// Options for [`DropboxFs::listdir`]
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only return names matching this shell-style pattern
    pub wildcard: Option<String>,
    /// Return absolute paths instead of bare names
    pub absolute: bool,
    pub dirs_only: bool,
    pub files_only: bool,
}

/// Cached state touched by a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// A single object (upload, folder creation)
    Path(String),
    /// An object and everything beneath it (delete, move, copy destination)
    Subtree(String),
}

impl Target {
    fn path(&self) -> &str {
        match self {
            Target::Path(p) | Target::Subtree(p) => p,
        }
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    key: String,
    subtree: bool,
}

#[derive(Debug, Default)]
struct MutationState {
    next_id: u64,
    /// Bumped each time a mutation finishes
    generation: u64,
    in_flight: HashMap<u64, Vec<InFlight>>,
}

impl MutationState {
    /// Whether metadata for `key` may be changing right now
    fn touches(&self, key: &str) -> bool {
        self.in_flight
            .values()
            .flatten()
            .any(|f| f.key == key || (f.subtree && path::is_within(key, &f.key)))
    }

    /// Whether the listing of folder `key` may be changing right now
    fn touches_listing(&self, key: &str) -> bool {
        self.touches(key)
            || self
                .in_flight
                .values()
                .flatten()
                .any(|f| path::is_within(&f.key, key))
    }
}

/// Deregisters a mutation when dropped, even if the remote call failed
struct MutationGuard<'a> {
    state: &'a Mutex<MutationState>,
    id: u64,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight.remove(&self.id);
        state.generation += 1;
    }
}

/// Dropbox account exposed as a filesystem
pub struct DropboxFs<R: RemoteStore> {
    /// Remote API
    remote: R,
    /// Metadata and listing cache
    cache: MetadataCache,
    /// Tokio runtime handle for async operations
    runtime: Handle,
    config: FsConfig,
    /// In-flight mutations and the generation counter
    mutations: Mutex<MutationState>,
}

impl DropboxFs<DropboxClient> {
    /// Connect to Dropbox with an OAuth2 access token
    pub fn connect(token: &str, runtime: Handle, config: FsConfig) -> Result<Self, FsError> {
        let client = DropboxClient::new(token, &config)?;
        Ok(Self::new(client, runtime, config))
    }
}

impl<R: RemoteStore> DropboxFs<R> {
    /// Create an adapter over a remote store
    ///
    /// Blocking calls are driven on `runtime`, so the adapter must not be
    /// used from inside one of that runtime's async tasks.
    pub fn new(remote: R, runtime: Handle, config: FsConfig) -> Self {
        info!(
            cache_ttl_secs = config.cache_ttl.as_secs(),
            max_buffer = config.max_buffer,
            "Dropbox filesystem ready"
        );
        Self {
            cache: MetadataCache::new(config.cache_ttl),
            remote,
            runtime,
            config,
            mutations: Mutex::new(MutationState::default()),
        }
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Cache hits, misses and hit rate
    pub fn cache_stats(&self) -> (u64, u64, f64) {
        self.cache.stats()
    }

    /// Info for a path, served from the cache when fresh
    pub fn info(&self, path: &str) -> Result<Info, FsError> {
        self.metadata(path, true).map(Info::from)
    }

    /// Info for a path straight from Dropbox
    ///
    /// The fresh record replaces whatever the cache held.
    pub fn info_uncached(&self, path: &str) -> Result<Info, FsError> {
        self.metadata(path, false).map(Info::from)
    }

    pub fn exists(&self, path: &str) -> Result<bool, FsError> {
        self.probe(path, |_| true)
    }

    pub fn is_dir(&self, path: &str) -> Result<bool, FsError> {
        self.probe(path, |r| r.is_directory)
    }

    pub fn is_file(&self, path: &str) -> Result<bool, FsError> {
        self.probe(path, |r| !r.is_directory)
    }

    /// List the names in a folder
    pub fn listdir(&self, path: &str, options: &ListOptions) -> Result<Vec<String>, FsError> {
        if options.dirs_only && options.files_only {
            return Err(FsError::InvalidArgument(
                "dirs_only and files_only cannot both be set".to_string(),
            ));
        }

        let path = normalize(path);
        let entries = self.children(&path)?;

        Ok(entries
            .into_iter()
            .filter(|e| !(options.dirs_only && !e.is_directory))
            .filter(|e| !(options.files_only && e.is_directory))
            .filter(|e| match &options.wildcard {
                Some(pattern) => path::matches_wildcard(&e.name, pattern),
                None => true,
            })
            .map(|e| {
                if options.absolute {
                    path::join(&path, &e.name)
                } else {
                    e.name
                }
            })
            .collect())
    }

    /// List a folder with full info for each entry
    pub fn scandir(&self, path: &str) -> Result<Vec<Info>, FsError> {
        let entries = self.children(&normalize(path))?;
        Ok(entries.into_iter().map(Info::from).collect())
    }

    /// Open a file for streaming reads
    ///
    /// The size is taken from a fresh metadata fetch so reads never stop
    /// short on a stale cached size.
    pub fn open_read(&self, path: &str) -> Result<RemoteReader<'_, R>, FsError> {
        let path = normalize(path);
        let record = self.metadata(&path, false)?;
        if record.is_directory {
            return Err(FsError::IsADirectory(path));
        }
        Ok(RemoteReader::new(self, path, record.size))
    }

    /// Read a whole file
    pub fn read_all(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let path = normalize(path);
        debug!(path = %path, "Downloading file");
        self.runtime
            .block_on(self.remote.download(&path, None))
            .map_err(download_error)
    }

    /// Open a file for writing; the upload happens on `finish`
    pub fn open_write(&self, path: &str) -> Result<SpooledWriter<'_, R>, FsError> {
        let path = normalize(path);
        if path == "/" {
            return Err(FsError::IsADirectory(path));
        }
        Ok(SpooledWriter::new(self, path, self.config.max_buffer))
    }

    /// Create or overwrite a file with `data`
    pub fn write_all(&self, path: &str, data: Vec<u8>) -> Result<Info, FsError> {
        let path = normalize(path);
        if path == "/" {
            return Err(FsError::IsADirectory(path));
        }

        let targets = [Target::Path(path.clone())];
        let record = self.mutate("upload", &targets, self.remote.upload(&path, data))?;
        self.remember(&record);
        Ok(record.into())
    }

    /// Copy a file or folder to a new path
    pub fn copy(&self, src: &str, dst: &str) -> Result<Info, FsError> {
        let (src, dst) = relocation_paths(src, dst)?;
        let targets = [Target::Subtree(dst.clone())];
        let record = self.mutate("copy", &targets, self.remote.copy_entry(&src, &dst))?;
        self.remember(&record);
        Ok(record.into())
    }

    /// Move or rename a file or folder
    pub fn move_entry(&self, src: &str, dst: &str) -> Result<Info, FsError> {
        let (src, dst) = relocation_paths(src, dst)?;
        let targets = [Target::Subtree(src.clone()), Target::Subtree(dst.clone())];
        let record = self.mutate("move", &targets, self.remote.move_entry(&src, &dst))?;
        self.remember(&record);
        Ok(record.into())
    }

    /// Create a folder; its parent is created remotely if missing
    pub fn makedir(&self, path: &str) -> Result<Info, FsError> {
        let path = normalize(path);
        if path == "/" {
            return Err(FsError::InvalidPath(path));
        }

        let targets = [Target::Path(path.clone())];
        let record = self.mutate("create_folder", &targets, self.remote.create_folder(&path))?;
        self.remember(&record);
        Ok(record.into())
    }

    /// Delete a file
    pub fn remove(&self, path: &str) -> Result<(), FsError> {
        let path = removable(path)?;
        if self.metadata(&path, false)?.is_directory {
            return Err(FsError::IsADirectory(path));
        }
        self.mutate("delete", &[Target::Subtree(path.clone())], self.remote.remove(&path))
    }

    /// Delete a folder and everything in it
    pub fn removedir(&self, path: &str) -> Result<(), FsError> {
        let path = removable(path)?;
        if !self.metadata(&path, false)?.is_directory {
            return Err(FsError::NotADirectory(path));
        }
        self.mutate("delete", &[Target::Subtree(path.clone())], self.remote.remove(&path))
    }

    /// Drop all cached state
    pub fn close(&self) {
        self.cache.log_metrics();
        self.cache.clear();
        info!("Dropbox filesystem closed");
    }

    /// Ranged download used by [`RemoteReader`]; `end` is inclusive
    pub(crate) fn download_range(&self, path: &str, start: u64, end: u64) -> Result<Vec<u8>, FsError> {
        debug!(path = %path, start, end, "Downloading range");
        self.runtime
            .block_on(self.remote.download(path, Some((start, end))))
            .map_err(download_error)
    }

    fn state(&self) -> MutexGuard<'_, MutationState> {
        self.mutations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn probe(&self, path: &str, check: impl Fn(&MetadataRecord) -> bool) -> Result<bool, FsError> {
        match self.metadata(path, true) {
            Ok(record) => Ok(check(&record)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read-through metadata lookup
    fn metadata(&self, path: &str, use_cache: bool) -> Result<MetadataRecord, FsError> {
        let path = normalize(path);
        let key = cache_key(&path);

        let generation = {
            let state = self.state();
            if use_cache && !state.touches(&key) {
                if let Some(record) = self.cache.get(&path) {
                    return Ok(record);
                }
            }
            state.generation
        };

        let record = self.runtime.block_on(self.remote.fetch_metadata(&path))?;

        let state = self.state();
        if state.generation == generation && !state.touches(&key) {
            self.cache.put(&path, record.clone());
        } else {
            debug!(path = %path, "Mutation overlapped fetch, not caching");
        }
        Ok(record)
    }

    /// Read-through folder listing; also caches each child's record
    fn children(&self, path: &str) -> Result<Vec<MetadataRecord>, FsError> {
        let key = cache_key(path);

        let generation = {
            let state = self.state();
            if !state.touches_listing(&key) {
                if let Some(entries) = self.cache.get_listing(path) {
                    return Ok(entries);
                }
                if let Some(record) = self.cache.peek(path) {
                    if !record.is_directory {
                        return Err(FsError::NotADirectory(path.to_string()));
                    }
                }
            }
            state.generation
        };

        let entries = self
            .runtime
            .block_on(self.remote.list_directory(path))
            .map_err(|e| match e {
                DropboxError::NotAFolder(p) => FsError::NotADirectory(p),
                other => FsError::Remote(other),
            })?;

        let state = self.state();
        if state.generation == generation && !state.touches_listing(&key) {
            for entry in &entries {
                self.cache.put(&entry.path, entry.clone());
            }
            self.cache.put_listing(path, entries.clone());
        } else {
            debug!(path = %path, "Mutation overlapped listing, not caching");
        }
        Ok(entries)
    }

    /// Store a record a mutation returned, unless its path is mid-mutation
    fn remember(&self, record: &MetadataRecord) {
        let state = self.state();
        if !state.touches(&cache_key(&record.path)) {
            self.cache.put(&record.path, record.clone());
        }
    }

    /// Invalidate everything a mutation on `targets` can change
    fn invalidate(&self, targets: &[Target]) {
        for target in targets {
            match target {
                Target::Path(p) => self.cache.invalidate(p),
                Target::Subtree(p) => self.cache.invalidate_prefix(p),
            }
            // Missing ancestors are created remotely, so every ancestor
            // listing can gain an entry
            let mut ancestor = path::parent(target.path());
            while let Some(dir) = ancestor {
                self.cache.invalidate_listing(&dir);
                ancestor = path::parent(&dir);
            }
        }
    }

    /// Run a mutating remote call together with its cache invalidation
    ///
    /// The targets are invalidated before the call starts and again after
    /// it ends, whether it succeeded or not. Remote errors are returned
    /// unchanged.
    fn mutate<T, F>(&self, operation: &str, targets: &[Target], call: F) -> Result<T, FsError>
    where
        F: Future<Output = Result<T, DropboxError>>,
    {
        let guard = {
            let mut state = self.state();
            let id = state.next_id;
            state.next_id += 1;
            state.in_flight.insert(
                id,
                targets
                    .iter()
                    .map(|t| InFlight {
                        key: cache_key(t.path()),
                        subtree: matches!(t, Target::Subtree(_)),
                    })
                    .collect(),
            );
            self.invalidate(targets);
            MutationGuard {
                state: &self.mutations,
                id,
            }
        };

        let result = self.runtime.block_on(call);
        self.invalidate(targets);
        drop(guard);

        match &result {
            Ok(_) => info!(operation, targets = ?targets, "Mutation complete"),
            Err(e) => warn!(operation, targets = ?targets, error = %e, "Mutation failed"),
        }
        Ok(result?)
    }
}

fn download_error(e: DropboxError) -> FsError {
    match e {
        DropboxError::NotAFile(p) => FsError::IsADirectory(p),
        other => FsError::Remote(other),
    }
}

fn relocation_paths(src: &str, dst: &str) -> Result<(String, String), FsError> {
    let (src, dst) = (normalize(src), normalize(dst));
    if src == "/" || dst == "/" {
        return Err(FsError::InvalidPath(
            "the root folder cannot be moved or replaced".to_string(),
        ));
    }
    Ok((src, dst))
}

fn removable(path: &str) -> Result<String, FsError> {
    let path = normalize(path);
    if path == "/" {
        return Err(FsError::InvalidPath("the root folder cannot be removed".to_string()));
    }
    Ok(path)
}
