//! Dropbox API Error Types
//!
//! Structured error handling for Dropbox API operations.
//! Maps HTTP status codes and Dropbox `error_summary` strings to specific
//! error variants for retry and errno decisions.

use serde::Deserialize;

/// Dropbox API error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropboxError {
    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    #[error("Rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Destination exists: {0}")]
    Conflict(String),

    #[error("Not a folder: {0}")]
    NotAFolder(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Content hash mismatch after upload: {0}")]
    HashMismatch(String),

    #[error("Request error: {0}")]
    Request(String),
}

/// Error body returned by Dropbox for 401/409 responses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_summary: String,
}

impl DropboxError {
    /// Map Dropbox error to an appropriate libc errno
    pub fn to_errno(&self) -> i32 {
        match self {
            DropboxError::AuthExpired(_) => libc::EACCES,
            DropboxError::RateLimited { .. } => libc::EAGAIN,
            DropboxError::NotFound(_) => libc::ENOENT,
            DropboxError::Forbidden(_) => libc::EACCES,
            DropboxError::Conflict(_) => libc::EEXIST,
            DropboxError::NotAFolder(_) => libc::ENOTDIR,
            DropboxError::NotAFile(_) => libc::EISDIR,
            DropboxError::BadInput(_) => libc::EINVAL,
            DropboxError::Network(_) => libc::EIO,
            DropboxError::Server(_, _) => libc::EIO,
            DropboxError::Timeout => libc::ETIMEDOUT,
            DropboxError::Decode(_) => libc::EIO,
            DropboxError::HashMismatch(_) => libc::EIO,
            DropboxError::Request(_) => libc::EIO,
        }
    }

    /// Whether this error is retryable
    ///
    /// Auth expiry is not retryable here: refreshing tokens is the caller's job.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DropboxError::RateLimited { .. }
                | DropboxError::Timeout
                | DropboxError::Network(_)
                | DropboxError::Server(_, _)
        )
    }

    /// Create a DropboxError from an HTTP status code and response body
    ///
    /// `path` names the object the request was about and is used for
    /// path-scoped errors so callers see which path failed.
    pub fn from_status(status: u16, body: &str, path: &str, retry_after: Option<u64>) -> Self {
        match status {
            400 => DropboxError::BadInput(body.trim().to_string()),
            401 => DropboxError::AuthExpired(summary_of(body)),
            403 => DropboxError::Forbidden(format!("{}: {}", path, summary_of(body))),
            408 => DropboxError::Timeout,
            409 => Self::from_summary(&summary_of(body), path),
            429 => DropboxError::RateLimited { retry_after },
            500..=599 => DropboxError::Server(status, body.to_string()),
            _ => DropboxError::Request(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Classify an endpoint-specific (409) error summary
    ///
    /// Summaries look like `path/not_found/..`, `from_lookup/not_found/`,
    /// `to/conflict/file/..`, `path/not_folder/` or `path/not_file/`.
    fn from_summary(summary: &str, path: &str) -> Self {
        let parts: Vec<&str> = summary.split('/').collect();
        let reason = parts.get(1).copied().unwrap_or_default();
        match reason {
            "not_found" => DropboxError::NotFound(path.to_string()),
            "conflict" => DropboxError::Conflict(path.to_string()),
            "not_folder" => DropboxError::NotAFolder(path.to_string()),
            "not_file" => DropboxError::NotAFile(path.to_string()),
            "no_write_permission" | "insufficient_permissions" => {
                DropboxError::Forbidden(path.to_string())
            }
            _ => DropboxError::Request(format!("{}: {}", path, summary)),
        }
    }
}

/// Extract `error_summary` from a Dropbox error body, falling back to the raw text
fn summary_of(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error_summary)
        .unwrap_or_else(|_| body.trim().to_string())
}

impl From<reqwest::Error> for DropboxError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DropboxError::Timeout
        } else if e.is_connect() || e.is_request() {
            DropboxError::Network(e.to_string())
        } else if e.is_decode() {
            DropboxError::Decode(e.to_string())
        } else {
            DropboxError::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_summary() {
        let body = r#"{"error_summary": "path/not_found/..", "error": {".tag": "path", "path": {".tag": "not_found"}}}"#;
        let err = DropboxError::from_status(409, body, "/a/b.txt", None);
        assert_eq!(err, DropboxError::NotFound("/a/b.txt".to_string()));
        assert_eq!(err.to_errno(), libc::ENOENT);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_lookup_variants() {
        let from = r#"{"error_summary": "from_lookup/not_found/.."}"#;
        assert!(matches!(
            DropboxError::from_status(409, from, "/src", None),
            DropboxError::NotFound(_)
        ));

        let to = r#"{"error_summary": "to/conflict/file/.."}"#;
        assert_eq!(
            DropboxError::from_status(409, to, "/dst", None),
            DropboxError::Conflict("/dst".to_string())
        );

        let not_folder = r#"{"error_summary": "path/not_folder/"}"#;
        assert_eq!(
            DropboxError::from_status(409, not_folder, "/file.txt", None).to_errno(),
            libc::ENOTDIR
        );
    }

    #[test]
    fn test_download_of_folder() {
        let body = r#"{"error_summary": "path/not_file/..", "error": {".tag": "path", "path": {".tag": "not_file"}}}"#;
        let err = DropboxError::from_status(409, body, "/dir", None);
        assert_eq!(err, DropboxError::NotAFile("/dir".to_string()));
        assert_eq!(err.to_errno(), libc::EISDIR);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        let expired = r#"{"error_summary": "expired_access_token/", "error": {".tag": "expired_access_token"}}"#;
        assert_eq!(
            DropboxError::from_status(401, expired, "/", None),
            DropboxError::AuthExpired("expired_access_token/".to_string())
        );
        assert_eq!(
            DropboxError::from_status(429, "", "/", Some(15)),
            DropboxError::RateLimited {
                retry_after: Some(15)
            }
        );
        assert!(DropboxError::from_status(503, "unavailable", "/", None).is_retryable());
        assert!(matches!(
            DropboxError::from_status(400, "Error in call to API function", "/", None),
            DropboxError::BadInput(_)
        ));
        assert!(matches!(
            DropboxError::from_status(418, "teapot", "/", None),
            DropboxError::Request(_)
        ));
    }

    #[test]
    fn test_auth_expired_is_not_retried() {
        assert!(!DropboxError::AuthExpired("invalid_access_token/".into()).is_retryable());
        assert!(DropboxError::RateLimited { retry_after: None }.is_retryable());
    }
}
