//! Photo download: remote URL in, bytes out, bytes into local storage
//!
//! Stored photos are named after the last path segment of their URL. A name
//! that already exists is never overwritten; the existing file is reused.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::StageError;

const USER_AGENT: &str = concat!("walk-tracker/", env!("CARGO_PKG_VERSION"));

/// Fetches the bytes behind a photo URL
#[async_trait]
pub trait PhotoFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StageError>;
}

/// Result of handing bytes to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhoto {
    /// Reference recorded on the checkpoint
    pub local_ref: String,
    /// False when a file with the same name was already present
    pub written: bool,
}

/// Local content storage for downloaded photos
#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Store `bytes` under `name` unless that name already exists
    async fn save_if_absent(&self, name: &str, bytes: &[u8]) -> Result<StoredPhoto, StageError>;

    /// Remove every stored photo, returning how many were removed
    async fn delete_all(&self) -> Result<usize, StageError>;
}

/// File name used to store the photo behind `url`
///
/// An unparseable URL or one without a usable last segment can never
/// succeed, so it is a permanent (upstream) failure.
pub fn photo_file_name(url: &str) -> Result<String, StageError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| StageError::Upstream(format!("Invalid photo URL {}: {}", url, e)))?;

    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != ".." && !name.contains('\\'))
        .map(str::to_string)
        .ok_or_else(|| StageError::Upstream(format!("Photo URL has no file name: {}", url)))
}

/// HTTP fetcher
pub struct HttpPhotoFetcher {
    http_client: reqwest::Client,
}

impl HttpPhotoFetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self, StageError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| StageError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl PhotoFetcher for HttpPhotoFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StageError> {
        let mut response = self.http_client.get(url).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(StageError::Upstream(format!("Download returned HTTP {}", status.as_u16())));
        }

        let mut bytes = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        while let Some(chunk) = response.chunk().await? {
            bytes.extend_from_slice(&chunk);
        }

        debug!(url = %url, size = bytes.len(), "Photo fetched");
        Ok(bytes)
    }
}

/// Stores photos as files in one directory
pub struct DirectoryPhotoStorage {
    root: PathBuf,
}

impl DirectoryPhotoStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a stored photo
    pub fn path_of(&self, local_ref: &str) -> PathBuf {
        self.root.join(local_ref)
    }
}

#[async_trait]
impl PhotoStorage for DirectoryPhotoStorage {
    async fn save_if_absent(&self, name: &str, bytes: &[u8]) -> Result<StoredPhoto, StageError> {
        let path = self.root.join(name);

        if tokio::fs::try_exists(&path).await? {
            debug!(name = %name, "Photo already stored, keeping existing file");
            return Ok(StoredPhoto {
                local_ref: name.to_string(),
                written: false,
            });
        }

        tokio::fs::create_dir_all(&self.root).await?;

        // Write to a hidden temp file first so a crash never leaves a
        // truncated photo under the final name
        let tmp_path = self.root.join(format!(".{}.partial", name));
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        info!(name = %name, size = bytes.len(), "Photo stored");
        Ok(StoredPhoto {
            local_ref: name.to_string(),
            written: true,
        })
    }

    async fn delete_all(&self) -> Result<usize, StageError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await?;
            } else {
                tokio::fs::remove_file(entry.path()).await?;
            }
            removed += 1;
        }

        info!(removed, "Stored photos deleted");
        Ok(removed)
    }
}
