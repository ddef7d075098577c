//! Storage facade.
//!
//! [`BlobStorage`] is the one surface callers use. Every operation opens a
//! bucket handle scoped to the directory it works in, does its work and
//! closes the handle again, on success, error and cancellation alike.
//!
//! Paths are `/`-separated and split at the last separator into
//! `(directory, leaf)`. A path ending in `/` addresses the directory marker
//! itself.
//!
//! # Example
//!
//! ```no_run
//! use objstore::{Backend, BlobStorage, CancellationToken};
//!
//! # async fn example() -> objstore::Result<()> {
//! let storage = BlobStorage::from_parts(&Backend::local("/var/backups"), None)?;
//! let cancel = CancellationToken::new();
//!
//! storage.upload("data/sample.txt", b"sample data", "", &cancel).await?;
//! let data = storage.get("data/sample.txt", &cancel).await?;
//! assert_eq!(&data[..], b"sample data");
//! # Ok(())
//! # }
//! ```

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use object_store::ObjectStore;
use std::future::Future;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::backend::Backend;
use crate::credentials::Credentials;
use crate::error::{Result, StorageError};
use crate::factory::BucketFactory;
use crate::path::{dir_key, is_dir_key, split, validate_dir};
use crate::secret::{CredentialBundle, SecretResolver};
use crate::traits::{Bucket, ListEntry, ListOptions, WriterOptions};

/// Provider-independent object storage facade.
///
/// Holds only immutable state; clones share the same connection base and
/// concurrent calls are safe.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    factory: Arc<BucketFactory>,
}

impl BlobStorage {
    /// Build a facade for `backend`, fetching its credentials secret from
    /// `namespace` when the descriptor names one.
    ///
    /// # Errors
    ///
    /// Fails on an unresolvable provider, a missing secret or secret key, or
    /// a malformed CA certificate. Nothing is opened yet.
    #[instrument(skip(resolver, backend))]
    pub async fn new(
        resolver: &dyn SecretResolver,
        namespace: &str,
        backend: &Backend,
    ) -> Result<Self> {
        backend.provider()?;

        let secret = match backend.storage_secret_name.as_deref() {
            Some(name) if !name.is_empty() => Some(resolver.fetch(namespace, name).await?),
            _ => None,
        };
        Self::from_parts(backend, secret.as_ref())
    }

    /// Build a facade from a descriptor and an already fetched secret.
    pub fn from_parts(backend: &Backend, secret: Option<&CredentialBundle>) -> Result<Self> {
        let credentials = Credentials::materialize(backend, secret)?;
        let factory = BucketFactory::new(backend, credentials)?;
        debug!("Storage facade for {}", factory.storage_url());
        Ok(Self {
            factory: Arc::new(factory),
        })
    }

    /// Build a facade over an existing store, scoped to `prefix`.
    pub fn with_store(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            factory: Arc::new(BucketFactory::from_store(store, prefix)),
        }
    }

    /// The factory handles are opened from.
    pub fn factory(&self) -> &BucketFactory {
        &self.factory
    }

    /// Check whether `path` exists.
    #[instrument(skip(self, cancel), fields(url = %self.factory.storage_url()))]
    pub async fn exists(&self, path: &str, cancel: &CancellationToken) -> Result<bool> {
        let (dir, key) = locate(path)?;
        let bucket = self.open(dir, cancel).await?;
        let result = cancellable(cancel, bucket.exists(&key)).await;
        BucketFactory::close(bucket).await;
        result
    }

    /// Read the whole object at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if it does not exist.
    #[instrument(skip(self, cancel), fields(url = %self.factory.storage_url()))]
    pub async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<Bytes> {
        let (dir, key) = locate(path)?;
        let bucket = self.open(dir, cancel).await?;
        let result = cancellable(cancel, read_object(bucket.as_ref(), &key)).await;
        BucketFactory::close(bucket).await;
        result
    }

    /// Write `data` to `path`, replacing any existing object.
    ///
    /// `content_type` is stored as given; an empty string stores none. It is
    /// never guessed from the key or the payload. A path ending in `/`
    /// creates that directory marker and accepts no data.
    #[instrument(skip(self, data, cancel), fields(url = %self.factory.storage_url(), size = data.len()))]
    pub async fn upload(
        &self,
        path: &str,
        data: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (dir, key) = locate(path)?;
        let bucket = self.open(dir, cancel).await?;
        let result = cancellable(cancel, async {
            if !is_dir_key(&key) {
                return write_object(bucket.as_ref(), &key, data, content_type).await;
            }
            if !data.is_empty() {
                return Err(StorageError::InvalidPath(format!(
                    "{} is a directory and takes no data",
                    path
                )));
            }
            bucket.create_dir(&key).await
        })
        .await;
        BucketFactory::close(bucket).await;
        result
    }

    /// Read every file below `dir`, at any depth.
    ///
    /// Directory markers are skipped, including zero-byte `x/` markers left
    /// by other tools. Contents come back in listing order. Every object is
    /// held in memory at once, so this is meant for small directories.
    #[instrument(skip(self, cancel), fields(url = %self.factory.storage_url()))]
    pub async fn list(&self, dir: &str, cancel: &CancellationToken) -> Result<Vec<Bytes>> {
        let bucket = self.open(dir, cancel).await?;
        let result = cancellable(cancel, async {
            let entries = bucket.list(&ListOptions::default()).await?;
            read_files(bucket.as_ref(), &entries).await
        })
        .await;
        BucketFactory::close(bucket).await;
        result
    }

    /// List directory keys below `dir`.
    ///
    /// `depth` 0 returns immediate child directories, each further level
    /// adds one generation, and a negative depth walks the whole subtree.
    /// Keys end with `/` and are relative to the backend prefix.
    #[instrument(skip(self, cancel), fields(url = %self.factory.storage_url()))]
    pub async fn list_dir_n(
        &self,
        dir: &str,
        depth: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        validate_dir(dir)?;
        let start = dir_key(dir).unwrap_or_default();
        let bucket = self.open("", cancel).await?;
        let result = cancellable(cancel, async {
            let mut dirs = Vec::new();
            walk_dirs(bucket.as_ref(), &start, 0, depth, &mut dirs).await?;
            Ok(dirs)
        })
        .await;
        BucketFactory::close(bucket).await;
        result
    }

    /// Delete `path`.
    ///
    /// With `is_dir` false exactly one key is removed and a missing key is
    /// `StorageError::NotFound`. With `is_dir` true every entry under the
    /// directory is removed one by one, then the directory marker itself;
    /// individual failures are collected into `StorageError::Aggregate`
    /// instead of stopping the cleanup.
    #[instrument(skip(self, cancel), fields(url = %self.factory.storage_url()))]
    pub async fn delete(&self, path: &str, is_dir: bool, cancel: &CancellationToken) -> Result<()> {
        if is_dir {
            return self.delete_dir(path, cancel).await;
        }

        let (dir, key) = locate(path)?;
        let bucket = self.open(dir, cancel).await?;
        let result = cancellable(cancel, bucket.delete(&key)).await;
        BucketFactory::close(bucket).await;
        result
    }

    async fn delete_dir(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        validate_dir(path)?;
        let marker = dir_key(path);
        let bucket = self.open("", cancel).await?;
        let result = cancellable(cancel, delete_tree(bucket.as_ref(), marker.as_deref())).await;
        BucketFactory::close(bucket).await;
        result
    }

    /// Create a zero-byte directory marker for `path`, so the directory shows
    /// up in [`list_dir_n`](Self::list_dir_n) before anything is stored in it.
    #[instrument(skip(self, cancel), fields(url = %self.factory.storage_url()))]
    pub async fn mark_as_directory(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        let key = dir_key(path)
            .ok_or_else(|| StorageError::InvalidPath("cannot mark the root as a directory".to_string()))?;
        validate_dir(path)?;
        let bucket = self.open("", cancel).await?;
        let result = cancellable(cancel, bucket.create_dir(&key)).await;
        BucketFactory::close(bucket).await;
        result
    }

    /// Verify the backend is writable: upload `data` to `path`, then delete
    /// it again.
    ///
    /// Each step is logged at info level and its request and outcome at
    /// trace level. HTTP retries are logged by `object_store` itself; enable
    /// its target with `RUST_LOG=object_store=debug` to see them.
    #[instrument(skip(self, data, cancel), fields(url = %self.factory.storage_url()))]
    pub async fn check_access(
        &self,
        path: &str,
        data: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (dir, key) = locate(path)?;
        let bucket = self.open(dir, cancel).await?;
        let result = cancellable(cancel, async {
            info!("Uploading data to backend...");
            trace!(key = %key, size = data.len(), content_type, "put request");
            let uploaded = write_object(bucket.as_ref(), &key, data, content_type).await;
            trace!(key = %key, ok = uploaded.is_ok(), "put response");
            uploaded?;

            info!("Cleaning up data from backend...");
            trace!(key = %key, "delete request");
            let deleted = bucket.delete(&key).await;
            trace!(key = %key, ok = deleted.is_ok(), "delete response");
            deleted
        })
        .await;
        BucketFactory::close(bucket).await;
        result
    }

    async fn open(&self, dir: &str, cancel: &CancellationToken) -> Result<Box<dyn Bucket>> {
        cancellable(cancel, self.factory.open(dir)).await
    }
}

/// Run `fut` unless `cancel` fires first; a cancelled future is dropped.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        res = fut => res,
    }
}

/// Split `path` into the directory to open and the key inside it.
fn locate(path: &str) -> Result<(&str, String)> {
    let (dir, leaf) = split(path);
    if !leaf.is_empty() {
        return Ok((dir, leaf.to_string()));
    }
    match dir_key(path) {
        Some(key) => Ok(("", key)),
        None => Err(StorageError::InvalidPath(format!("{:?} names no object", path))),
    }
}

async fn read_object(bucket: &dyn Bucket, key: &str) -> Result<Bytes> {
    let mut reader = bucket.reader(key).await?;
    let mut buf = BytesMut::new();
    while let Some(chunk) = reader.try_next().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

async fn write_object(bucket: &dyn Bucket, key: &str, data: &[u8], content_type: &str) -> Result<()> {
    let options = WriterOptions {
        content_type: (!content_type.is_empty()).then(|| content_type.to_string()),
    };
    let mut writer = bucket.writer(key, &options).await?;
    let written = writer.write_all(data).await;
    let closed = writer.shutdown().await;
    written?;
    closed?;
    Ok(())
}

/// Read every file entry in listing order.
///
/// A zero-byte entry that reads as NotFound is a bare `x/` marker the store
/// reported as the file `x`; it is skipped.
async fn read_files(bucket: &dyn Bucket, entries: &[ListEntry]) -> Result<Vec<Bytes>> {
    let mut objects = Vec::new();
    for entry in entries.iter().filter(|e| e.is_file()) {
        match read_object(bucket, &entry.key).await {
            Ok(data) => objects.push(data),
            Err(e) if entry.size == 0 && e.is_not_found() => {
                debug!("Skipping unreadable empty entry {}", entry.key);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(objects)
}

/// Delete everything below `marker` (the whole bucket for `None`), then the
/// marker itself. Failures are collected, not fatal; only a failed listing
/// aborts.
async fn delete_tree(bucket: &dyn Bucket, marker: Option<&str>) -> Result<()> {
    let mut entries = bucket
        .list(&ListOptions::flat(marker.unwrap_or_default()))
        .await?;
    // Children sort after their directory key; walk backwards so they go first.
    entries.reverse();

    let mut errors = Vec::new();
    for entry in &entries {
        match bucket.delete(&entry.key).await {
            Ok(()) => {}
            Err(e) if entry.size == 0 && e.is_not_found() => {
                debug!("Skipping vanished empty entry {}", entry.key);
            }
            Err(e) => errors.push(e),
        }
    }

    if let Some(marker) = marker {
        match bucket.delete(marker).await {
            Err(e) if !e.is_not_found() => errors.push(e),
            _ => {}
        }
    }

    debug!("Deleted {} entries with {} failures", entries.len(), errors.len());
    StorageError::aggregate(errors)
}

/// Collect directory keys below `prefix` one delimited level at a time.
#[async_recursion::async_recursion]
async fn walk_dirs(
    bucket: &dyn Bucket,
    prefix: &str,
    depth: i32,
    max_depth: i32,
    dirs: &mut Vec<String>,
) -> Result<()> {
    let entries = bucket.list(&ListOptions::delimited(prefix)).await?;
    for entry in entries.into_iter().filter(|e| e.is_dir) {
        let descend = max_depth < 0 || depth < max_depth;
        dirs.push(entry.key.clone());
        if descend {
            walk_dirs(bucket, &entry.key, depth + 1, max_depth, dirs).await?;
        }
    }
    Ok(())
}
