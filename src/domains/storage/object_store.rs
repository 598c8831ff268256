use crate::errors::{StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Trait for the object store finished files are published to
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `local_path` under `key`, returning the object's location
    async fn put_file(&self, local_path: &Path, key: &str) -> StorageResult<String>;
}

// --- S3 Implementation ---

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Client from the default AWS credential and region chain
    pub async fn from_env(bucket: &str) -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), bucket)
    }

    pub fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_file(&self, local_path: &Path, key: &str) -> StorageResult<String> {
        debug!("Uploading {} to {}", local_path.display(), self.location(key));

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: format!("Failed to read local file: {}", e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("text/csv")
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(self.location(key))
    }
}

// --- Local Directory Implementation ---

/// Publishes into a local directory that mirrors the bucket layout
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path for a key, rejecting keys that would escape the root
    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        let escapes = key
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
        if escapes {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "invalid path component in key".to_string(),
            });
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_file(&self, local_path: &Path, key: &str) -> StorageResult<String> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let bytes = fs::copy(local_path, &target).await?;
        info!("Copied {} bytes to {}", bytes, target.display());

        Ok(target.to_string_lossy().into_owned())
    }
}

/// In-memory store for testing; keeps a copy of every uploaded file
#[cfg(test)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
    fail_with: Option<String>,
}

#[cfg(test)]
impl MemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: std::sync::Mutex::new(Vec::new()),
            fail_with: None,
        }
    }

    /// Store whose every upload fails
    pub fn failing(bucket: &str, message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(bucket)
        }
    }

    /// `(key, content)` of every upload, in order
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.objects.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_file(&self, local_path: &Path, key: &str) -> StorageResult<String> {
        if let Some(message) = &self.fail_with {
            return Err(StorageError::Upload { key: key.to_string(), message: message.clone() });
        }
        let content = fs::read(local_path).await?;
        self.objects.lock().unwrap().push((key.to_string(), content));
        Ok(format!("{}/{}", self.bucket, key))
    }
}
