//! Local filesystem bucket.
//!
//! Keys map onto paths below the bucket root. Directory markers are real
//! directories, so `mark_as_directory` on a local backend shows up as an
//! (empty) directory on disk.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::path::{is_dir_key, split, validate_key};
use crate::traits::{Bucket, ListEntry, ListOptions, ObjectReader, ObjectWriter, WriterOptions};

/// Local filesystem bucket rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    /// Create a bucket rooted at `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open a bucket rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Config` if the root does not exist or is not a
    /// directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(Self { root }),
            Ok(_) => Err(StorageError::Config(format!(
                "Base path is not a directory: {}",
                root.display()
            ))),
            Err(e) => Err(StorageError::Config(format!(
                "Failed to resolve path '{}': {} (path must exist)",
                root.display(),
                e
            ))),
        }
    }

    /// Get the root directory of this bucket.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a key to a filesystem path.
    fn to_fs_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key.trim_end_matches('/')))
    }

    /// Ensure parent directories exist for a path.
    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Directory to scan for a listing prefix, plus the key prefix of its
    /// entries.
    fn scan_root(&self, prefix: &str) -> Result<(PathBuf, String)> {
        let (dir, _) = split(prefix);
        if dir.is_empty() {
            return Ok((self.root.clone(), String::new()));
        }
        Ok((self.to_fs_path(dir)?, dir.to_string()))
    }
}

fn modified_secs(meta: &std::fs::Metadata) -> Option<i64> {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

#[async_trait]
impl Bucket for LocalBucket {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn exists(&self, key: &str) -> Result<bool> {
        let fs_path = self.to_fs_path(key)?;
        match fs::metadata(&fs_path).await {
            Ok(meta) if is_dir_key(key) => Ok(meta.is_dir()),
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn reader(&self, key: &str) -> Result<ObjectReader> {
        let fs_path = self.to_fs_path(key)?;
        if is_dir_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        debug!("Reading from {:?}", fs_path);

        match fs::metadata(&fs_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(StorageError::NotFound(key.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        let file = match fs::File::open(&fs_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(ReaderStream::new(file)
            .map(|chunk| chunk.map_err(StorageError::from))
            .boxed())
    }

    #[instrument(skip(self, options), fields(root = %self.root.display()))]
    async fn writer(&self, key: &str, options: &WriterOptions) -> Result<ObjectWriter> {
        let fs_path = self.to_fs_path(key)?;
        if is_dir_key(key) {
            return Err(StorageError::InvalidPath(format!("{} is a directory", key)));
        }

        if let Some(content_type) = &options.content_type {
            debug!("Content type {} is not stored by local buckets", content_type);
        }
        self.ensure_parent(&fs_path).await?;
        debug!("Writing to {:?}", fs_path);
        let file = fs::File::create(&fs_path).await?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn create_dir(&self, key: &str) -> Result<()> {
        let fs_path = self.to_fs_path(key)?;
        if !is_dir_key(key) {
            return Err(StorageError::InvalidPath(format!("{} is not a directory", key)));
        }
        debug!("Creating directory {:?}", fs_path);
        fs::create_dir_all(&fs_path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn delete(&self, key: &str) -> Result<()> {
        let fs_path = self.to_fs_path(key)?;
        debug!("Deleting {:?}", fs_path);

        let meta = match fs::metadata(&fs_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if is_dir_key(key) {
            if !meta.is_dir() {
                return Err(StorageError::NotFound(key.to_string()));
            }
            fs::remove_dir(&fs_path).await?;
        } else {
            if !meta.is_file() {
                return Err(StorageError::NotFound(key.to_string()));
            }
            fs::remove_file(&fs_path).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn list(&self, options: &ListOptions) -> Result<Vec<ListEntry>> {
        let delimited = options.is_delimited()?;
        let prefix = options.prefix_str();
        let (scan_dir, key_prefix) = self.scan_root(prefix)?;
        let mut results = Vec::new();

        match fs::metadata(&scan_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(results),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(e.into()),
        }

        if delimited {
            self.list_level(&scan_dir, &key_prefix, &mut results).await?;
        } else {
            self.list_recursive(&scan_dir, &key_prefix, &mut results)
                .await?;
        }

        results.retain(|entry| entry.key.starts_with(prefix) && entry.key != prefix);
        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

impl LocalBucket {
    /// List the immediate children of a directory.
    async fn list_level(
        &self,
        dir: &Path,
        key_prefix: &str,
        results: &mut Vec<ListEntry>,
    ) -> Result<()> {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().await?;

            if metadata.is_dir() {
                results.push(ListEntry::dir(format!("{}{}/", key_prefix, name)));
            } else if metadata.is_file() {
                results.push(ListEntry::file(
                    format!("{}{}", key_prefix, name),
                    metadata.len(),
                    modified_secs(&metadata),
                ));
            }
        }

        Ok(())
    }

    /// Recursively list files and directories below a directory.
    #[async_recursion::async_recursion]
    async fn list_recursive(
        &self,
        dir: &Path,
        key_prefix: &str,
        results: &mut Vec<ListEntry>,
    ) -> Result<()> {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().await?;

            if metadata.is_dir() {
                let dir_key = format!("{}{}/", key_prefix, name);
                results.push(ListEntry::dir(dir_key.clone()));
                self.list_recursive(&path, &dir_key, results).await?;
            } else if metadata.is_file() {
                results.push(ListEntry::file(
                    format!("{}{}", key_prefix, name),
                    metadata.len(),
                    modified_secs(&metadata),
                ));
            }
        }

        Ok(())
    }
}
