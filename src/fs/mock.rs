//! In-memory remote store for adapter tests
//!
//! Counts calls per operation so tests can tell cache hits from remote
//! round trips, and can inject a one-shot failure.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::Utc;

use crate::dropbox::hash::content_hash;
use crate::dropbox::{DropboxError, MetadataRecord, RemoteStore};
use crate::path::{self, cache_key, normalize};

struct Object {
    record: MetadataRecord,
    content: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct MockRemote {
    objects: Mutex<BTreeMap<String, Object>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    fail_next: Mutex<Option<DropboxError>>,
    revision: AtomicU64,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folder(self, path: &str) -> Self {
        self.put_folder(&normalize(path));
        self
    }

    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        self.put_file(&normalize(path), content.to_vec());
        self
    }

    /// Change a file behind the adapter's back, as another client would
    pub fn set_external(&self, path: &str, content: &[u8]) {
        self.put_file(&normalize(path), content.to_vec());
    }

    /// Number of calls made to `op`
    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Make the next call fail with `err`
    pub fn fail_next(&self, err: DropboxError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&cache_key(path))
            .map(|o| o.content.clone())
    }

    fn begin(&self, op: &'static str) -> Result<(), DropboxError> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn folder_record(path: &str) -> MetadataRecord {
        MetadataRecord {
            path: path.to_string(),
            name: path::base_name(path).to_string(),
            size: 0,
            is_directory: true,
            rev: None,
            content_hash: None,
            modified: None,
            fetched_at: SystemTime::now(),
        }
    }

    fn put_folder(&self, path: &str) -> MetadataRecord {
        let mut objects = self.objects.lock().unwrap();
        Self::ensure_parents(&mut objects, path);
        let record = Self::folder_record(path);
        objects.insert(
            cache_key(path),
            Object {
                record: record.clone(),
                content: Vec::new(),
            },
        );
        record
    }

    fn put_file(&self, path: &str, content: Vec<u8>) -> MetadataRecord {
        let rev = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        let record = MetadataRecord {
            path: path.to_string(),
            name: path::base_name(path).to_string(),
            size: content.len() as u64,
            is_directory: false,
            rev: Some(format!("{:012x}", rev)),
            content_hash: Some(content_hash(&content)),
            modified: Some(Utc::now()),
            fetched_at: SystemTime::now(),
        };
        let mut objects = self.objects.lock().unwrap();
        Self::ensure_parents(&mut objects, path);
        objects.insert(
            cache_key(path),
            Object {
                record: record.clone(),
                content,
            },
        );
        record
    }

    fn ensure_parents(objects: &mut BTreeMap<String, Object>, path: &str) {
        let mut ancestor = path::parent(path);
        while let Some(dir) = ancestor {
            if dir != "/" {
                objects.entry(cache_key(&dir)).or_insert_with(|| Object {
                    record: Self::folder_record(&dir),
                    content: Vec::new(),
                });
            }
            ancestor = path::parent(&dir);
        }
    }

    fn subtree_keys(objects: &BTreeMap<String, Object>, path: &str) -> Vec<String> {
        let prefix = cache_key(path);
        objects
            .keys()
            .filter(|k| path::is_within(k, &prefix))
            .cloned()
            .collect()
    }

    fn relocate(&self, from: &str, to: &str, keep_source: bool) -> Result<MetadataRecord, DropboxError> {
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&cache_key(from)) {
            return Err(DropboxError::NotFound(from.to_string()));
        }
        if objects.contains_key(&cache_key(to)) {
            return Err(DropboxError::Conflict(to.to_string()));
        }

        let mut moved = Vec::new();
        for key in Self::subtree_keys(&objects, from) {
            let object = if keep_source {
                let o = &objects[&key];
                Object {
                    record: o.record.clone(),
                    content: o.content.clone(),
                }
            } else {
                objects.remove(&key).unwrap()
            };
            let new_path = format!("{}{}", to, &object.record.path[from.len()..]);
            let mut record = object.record;
            record.name = path::base_name(&new_path).to_string();
            record.path = new_path.clone();
            moved.push((
                new_path,
                Object {
                    record,
                    content: object.content,
                },
            ));
        }
        Self::ensure_parents(&mut objects, to);
        for (new_path, object) in moved {
            objects.insert(cache_key(&new_path), object);
        }
        Ok(objects[&cache_key(to)].record.clone())
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn fetch_metadata(&self, path: &str) -> Result<MetadataRecord, DropboxError> {
        self.begin("fetch_metadata")?;
        if path == "/" {
            return Ok(MetadataRecord::root());
        }
        self.objects
            .lock()
            .unwrap()
            .get(&cache_key(path))
            .map(|o| o.record.clone())
            .ok_or_else(|| DropboxError::NotFound(path.to_string()))
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<MetadataRecord>, DropboxError> {
        self.begin("list_directory")?;
        let objects = self.objects.lock().unwrap();
        let key = cache_key(path);
        if key != "/" {
            match objects.get(&key) {
                None => return Err(DropboxError::NotFound(path.to_string())),
                Some(o) if !o.record.is_directory => {
                    return Err(DropboxError::NotAFolder(path.to_string()))
                }
                Some(_) => {}
            }
        }
        Ok(objects
            .iter()
            .filter(|(k, _)| path::parent(k).as_deref() == Some(key.as_str()))
            .map(|(_, o)| o.record.clone())
            .collect())
    }

    async fn download(&self, path: &str, range: Option<(u64, u64)>) -> Result<Vec<u8>, DropboxError> {
        self.begin("download")?;
        let objects = self.objects.lock().unwrap();
        let object = objects
            .get(&cache_key(path))
            .ok_or_else(|| DropboxError::NotFound(path.to_string()))?;
        if object.record.is_directory {
            return Err(DropboxError::NotAFile(path.to_string()));
        }
        let content = &object.content;
        Ok(match range {
            Some((start, end)) => {
                let start = (start as usize).min(content.len());
                let end = (end as usize + 1).min(content.len());
                content[start..end].to_vec()
            }
            None => content.clone(),
        })
    }

    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<MetadataRecord, DropboxError> {
        self.begin("upload")?;
        Ok(self.put_file(path, data))
    }

    async fn remove(&self, path: &str) -> Result<(), DropboxError> {
        self.begin("remove")?;
        let mut objects = self.objects.lock().unwrap();
        let keys = Self::subtree_keys(&objects, path);
        if keys.is_empty() {
            return Err(DropboxError::NotFound(path.to_string()));
        }
        for key in keys {
            objects.remove(&key);
        }
        Ok(())
    }

    async fn move_entry(&self, from: &str, to: &str) -> Result<MetadataRecord, DropboxError> {
        self.begin("move_entry")?;
        self.relocate(from, to, false)
    }

    async fn copy_entry(&self, from: &str, to: &str) -> Result<MetadataRecord, DropboxError> {
        self.begin("copy_entry")?;
        self.relocate(from, to, true)
    }

    async fn create_folder(&self, path: &str) -> Result<MetadataRecord, DropboxError> {
        self.begin("create_folder")?;
        if self.objects.lock().unwrap().contains_key(&cache_key(path)) {
            return Err(DropboxError::Conflict(path.to_string()));
        }
        Ok(self.put_folder(path))
    }
}
