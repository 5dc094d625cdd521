//! Dropbox API Client
//!
//! Provides authenticated access to a Dropbox account over the HTTP API v2:
//! RPC endpoints on `api.dropboxapi.com` for metadata, listing and
//! relocation, content endpoints on `content.dropboxapi.com` for upload and
//! download.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RANGE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::errors::DropboxError;
use super::hash::content_hash;
use super::store::RemoteStore;
use super::types::{
    CreateFolderResult, FileMetadata, GetMetadataArg, ListFolderArg, ListFolderResult, Metadata,
    MetadataRecord, PathArg, RelocationArg, RelocationResult, UploadArg,
};
use crate::config::FsConfig;

/// RPC endpoint base
const API_URL: &str = "https://api.dropboxapi.com/2";

/// Content endpoint base
const CONTENT_URL: &str = "https://content.dropboxapi.com/2";

/// Header carrying JSON arguments for content endpoints
const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Page size for folder listings
const LIST_LIMIT: u32 = 2000;

/// Upper bound for a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Request body for `files/list_folder/continue`
#[derive(Debug, Serialize)]
struct CursorArg<'a> {
    cursor: &'a str,
}

/// Request body for `files/create_folder_v2`
#[derive(Debug, Serialize)]
struct CreateFolderArg<'a> {
    path: &'a str,
    autorename: bool,
}

/// Dropbox API client for making authenticated requests
#[derive(Clone)]
pub struct DropboxClient {
    /// HTTP client for making requests
    http_client: Client,
    /// OAuth2 access token
    token: String,
    /// Retry budget for idempotent calls
    max_retries: u32,
}

impl DropboxClient {
    /// Create a client for an already-issued access token
    pub fn new(token: &str, config: &FsConfig) -> Result<Self, DropboxError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DropboxError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            token: token.to_string(),
            max_retries: config.max_retries,
        })
    }

    /// Execute an idempotent operation with retry logic and exponential backoff
    async fn with_retry<F, Fut, T>(&self, operation: &str, path: &str, f: F) -> Result<T, DropboxError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DropboxError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = match &e {
                        DropboxError::RateLimited {
                            retry_after: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => backoff(attempt),
                    };
                    attempt += 1;
                    warn!(
                        operation = operation,
                        path = path,
                        attempt = attempt,
                        max = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying Dropbox operation"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(operation = operation, path = path, error = %e, "Dropbox operation failed");
                    return Err(e);
                }
            }
        }
    }

    /// POST a JSON argument to an RPC endpoint and decode the JSON result
    async fn rpc<A, R>(&self, endpoint: &str, arg: &A, path: &str) -> Result<R, DropboxError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", API_URL, endpoint);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.token)
            .json(arg)
            .send()
            .await?;

        let response = check_status(response, path).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| DropboxError::Decode(format!("{}: {}", endpoint, e)))
    }

    /// Build a request to a content endpoint with its `Dropbox-API-Arg` header
    fn content_request<A: Serialize>(&self, endpoint: &str, arg: &A) -> Result<RequestBuilder, DropboxError> {
        let url = format!("{}/{}", CONTENT_URL, endpoint);
        Ok(self
            .http_client
            .post(&url)
            .bearer_auth(&self.token)
            .header(API_ARG_HEADER, api_arg(arg)?))
    }

    /// Get metadata for a single non-root path
    async fn get_metadata(&self, path: &str) -> Result<MetadataRecord, DropboxError> {
        let arg = GetMetadataArg {
            path,
            include_deleted: false,
        };
        let metadata: Metadata = self.rpc("files/get_metadata", &arg, path).await?;
        MetadataRecord::from_metadata(metadata, path)
            .ok_or_else(|| DropboxError::NotFound(path.to_string()))
    }

    /// List every page of a folder, skipping deleted entries
    async fn list_folder(&self, path: &str) -> Result<Vec<MetadataRecord>, DropboxError> {
        let arg = ListFolderArg {
            path: api_path(path),
            recursive: false,
            include_deleted: false,
            limit: LIST_LIMIT,
        };
        let mut page: ListFolderResult = self.rpc("files/list_folder", &arg, path).await?;
        let mut entries = Vec::with_capacity(page.entries.len());

        loop {
            entries.extend(
                page.entries
                    .into_iter()
                    .filter_map(|m| MetadataRecord::from_metadata(m, path)),
            );
            if !page.has_more {
                break;
            }
            debug!(path = path, cursor = %page.cursor, "Fetching next listing page");
            let cursor = CursorArg {
                cursor: &page.cursor,
            };
            page = self.rpc("files/list_folder/continue", &cursor, path).await?;
        }

        debug!(path = path, count = entries.len(), "Listed folder from Dropbox");
        Ok(entries)
    }

    /// Download file bytes, optionally restricted to an inclusive byte range
    async fn download_range(
        &self,
        path: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<u8>, DropboxError> {
        let mut request = self.content_request("files/download", &PathArg { path })?;
        if let Some((start, end)) = range {
            request = request.header(RANGE, format!("bytes={}-{}", start, end));
        }

        debug!(path = path, range = ?range, "Downloading file from Dropbox");
        let response = request.send().await?;
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(Vec::new());
        }
        let response = check_status(response, path).await?;
        let bytes = response.bytes().await?;

        debug!(path = path, size = bytes.len(), "Downloaded file from Dropbox");
        Ok(bytes.to_vec())
    }

    /// Map a conflict on a relocation to the destination path
    fn relocation_error(e: DropboxError, to: &str) -> DropboxError {
        match e {
            DropboxError::Conflict(_) => DropboxError::Conflict(to.to_string()),
            other => other,
        }
    }

    async fn relocate(&self, endpoint: &str, from: &str, to: &str) -> Result<MetadataRecord, DropboxError> {
        let arg = RelocationArg {
            from_path: from,
            to_path: to,
            autorename: false,
        };
        let result: RelocationResult = self
            .rpc(endpoint, &arg, from)
            .await
            .map_err(|e| Self::relocation_error(e, to))?;
        MetadataRecord::from_metadata(result.metadata, to)
            .ok_or_else(|| DropboxError::Decode(format!("{} returned deleted metadata", endpoint)))
    }
}

#[async_trait]
impl RemoteStore for DropboxClient {
    async fn fetch_metadata(&self, path: &str) -> Result<MetadataRecord, DropboxError> {
        // get_metadata rejects the root folder
        if path == "/" {
            return Ok(MetadataRecord::root());
        }
        self.with_retry("get_metadata", path, || self.get_metadata(path))
            .await
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<MetadataRecord>, DropboxError> {
        self.with_retry("list_folder", path, || self.list_folder(path))
            .await
    }

    async fn download(&self, path: &str, range: Option<(u64, u64)>) -> Result<Vec<u8>, DropboxError> {
        self.with_retry("download", path, || self.download_range(path, range))
            .await
    }

    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<MetadataRecord, DropboxError> {
        let arg = UploadArg {
            path,
            mode: "overwrite",
            autorename: false,
            mute: false,
        };
        let local_hash = content_hash(&data);
        let size = data.len();

        info!(path = path, size = size, "Uploading file to Dropbox");

        let response = self
            .content_request("files/upload", &arg)?
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        let response = check_status(response, path).await?;
        let file: FileMetadata = response
            .json()
            .await
            .map_err(|e| DropboxError::Decode(format!("files/upload: {}", e)))?;

        if let Some(remote_hash) = &file.content_hash {
            if *remote_hash != local_hash {
                return Err(DropboxError::HashMismatch(path.to_string()));
            }
        }

        info!(path = path, rev = %file.rev, "File uploaded to Dropbox");
        Ok(MetadataRecord::from_file(file, path))
    }

    async fn remove(&self, path: &str) -> Result<(), DropboxError> {
        info!(path = path, "Deleting from Dropbox");
        let _: RelocationResult = self.rpc("files/delete_v2", &PathArg { path }, path).await?;
        Ok(())
    }

    async fn move_entry(&self, from: &str, to: &str) -> Result<MetadataRecord, DropboxError> {
        info!(from = from, to = to, "Moving in Dropbox");
        self.relocate("files/move_v2", from, to).await
    }

    async fn copy_entry(&self, from: &str, to: &str) -> Result<MetadataRecord, DropboxError> {
        info!(from = from, to = to, "Copying in Dropbox");
        self.relocate("files/copy_v2", from, to).await
    }

    async fn create_folder(&self, path: &str) -> Result<MetadataRecord, DropboxError> {
        info!(path = path, "Creating folder in Dropbox");
        let arg = CreateFolderArg {
            path,
            autorename: false,
        };
        let result: CreateFolderResult = self.rpc("files/create_folder_v2", &arg, path).await?;
        Ok(MetadataRecord::from_folder(result.metadata, path))
    }
}

/// Turn a non-success response into a typed error
async fn check_status(response: Response, path: &str) -> Result<Response, DropboxError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    let body = response.text().await.unwrap_or_default();
    Err(DropboxError::from_status(status.as_u16(), &body, path, retry_after))
}

/// Dropbox addresses the root folder as the empty string in listings
fn api_path(path: &str) -> &str {
    if path == "/" {
        ""
    } else {
        path
    }
}

/// Serialize a `Dropbox-API-Arg` value; HTTP headers must be ASCII, so
/// everything else is escaped as `\uXXXX`
fn api_arg<A: Serialize>(arg: &A) -> Result<String, DropboxError> {
    let json = serde_json::to_string(arg).map_err(|e| DropboxError::Request(e.to_string()))?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(out)
}

/// Exponential backoff: 500ms, 1s, 2s, ... capped at `MAX_BACKOFF`
fn backoff(attempt: u32) -> Duration {
    let delay = Duration::from_millis(500).saturating_mul(1 << attempt.min(16));
    delay.min(MAX_BACKOFF)
}
