//! Core bucket trait definitions.
//!
//! A [`Bucket`] is an open handle to a provider's flat key space. Handles are
//! cheap to drop but not meant to be kept: the facade opens one per
//! operation and closes it when the operation ends.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;

use crate::error::{Result, StorageError};

/// Stream of object content chunks. Dropping it releases the underlying
/// reader.
pub type ObjectReader = BoxStream<'static, Result<Bytes>>;

/// Sink for object content. The object is committed by `shutdown()`.
pub type ObjectWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Key relative to the bucket; directory keys end with `/`
    pub key: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds)
    pub last_modified: Option<i64>,
    /// Whether this entry is a directory rather than a file
    pub is_dir: bool,
}

impl ListEntry {
    /// A file entry.
    pub fn file(key: impl Into<String>, size: u64, last_modified: Option<i64>) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
            is_dir: false,
        }
    }

    /// A directory entry. `key` must end with `/`.
    pub fn dir(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: 0,
            last_modified: None,
            is_dir: true,
        }
    }

    /// Whether this is a leaf object, not a directory marker.
    pub fn is_file(&self) -> bool {
        !self.is_dir && !self.key.is_empty() && !self.key.ends_with('/')
    }
}

/// Options for list operations.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only return keys starting with this prefix
    pub prefix: Option<String>,
    /// Delimiter for hierarchical listing; only `/` is supported.
    ///
    /// With a delimiter, keys are grouped at the first delimiter after the
    /// prefix and returned once as directory entries. Without one the
    /// listing is flat and covers every depth.
    pub delimiter: Option<String>,
}

impl ListOptions {
    /// Flat listing of everything under `prefix`.
    pub fn flat(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            delimiter: None,
        }
    }

    /// One-level listing of `prefix`.
    pub fn delimited(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            delimiter: Some("/".to_string()),
        }
    }

    pub(crate) fn prefix_str(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    /// `true` for a `/`-delimited listing, error for any other delimiter.
    pub(crate) fn is_delimited(&self) -> Result<bool> {
        match self.delimiter.as_deref() {
            None => Ok(false),
            Some("/") => Ok(true),
            Some(other) => Err(StorageError::NotSupported(format!(
                "list delimiter {:?}",
                other
            ))),
        }
    }
}

/// Options for writers.
///
/// Content type is never inferred from the key or the payload; it is the
/// caller's value or nothing.
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub content_type: Option<String>,
}

/// Open handle to a flat key-value namespace.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`.
///
/// # Error Handling
///
/// Missing keys are reported as `StorageError::NotFound` by `reader` and
/// `delete`; `exists` reports them as `Ok(false)`.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Check if a key exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Open a read stream on a key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the key does not exist.
    async fn reader(&self, key: &str) -> Result<ObjectReader>;

    /// Open a write stream on a file key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` for a key ending in `/`; markers
    /// are made with [`create_dir`](Self::create_dir).
    async fn writer(&self, key: &str, options: &WriterOptions) -> Result<ObjectWriter>;

    /// Create the directory marker `key`, which must end in `/`. Creating an
    /// existing marker succeeds.
    async fn create_dir(&self, key: &str) -> Result<()>;

    /// Delete one key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the key does not exist.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List keys, sorted lexicographically.
    async fn list(&self, options: &ListOptions) -> Result<Vec<ListEntry>>;

    /// Release resources held by the handle.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Get a human-readable name for this bucket implementation.
    fn backend_name(&self) -> &'static str;
}
