//! Object store bucket.
//!
//! Wraps any `object_store::ObjectStore` (S3, GCS, Azure, in-memory) behind
//! the [`Bucket`] trait.
//!
//! Keys are handed to the store verbatim: a key such as `a~b#1.txt` is
//! stored under that exact name and comes back unchanged in listings.
//!
//! Object store paths cannot end with a separator, so a directory marker
//! `a/b/` is stored as the zero-byte object `a/b/.dir` and decoded back to
//! `a/b/` in listings. Markers written by other tools as a bare `a/b/`
//! object are listed as the zero-byte file `a/b`, which cannot be read back;
//! delimited listings still report them as directories.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::path::{is_dir_key, split, validate_key};
use crate::traits::{Bucket, ListEntry, ListOptions, ObjectReader, ObjectWriter, WriterOptions};

/// Leaf name of the object standing in for a directory marker.
pub const DIR_MARKER: &str = ".dir";

/// Bucket over an `ObjectStore`.
#[derive(Clone)]
pub struct ObjectStoreBucket {
    store: Arc<dyn ObjectStore>,
    name: &'static str,
}

impl ObjectStoreBucket {
    /// Wrap a store. `name` is reported by `backend_name()`.
    pub fn new(store: Arc<dyn ObjectStore>, name: &'static str) -> Self {
        Self { store, name }
    }

    /// Convert a key to an object_store path without percent-encoding it.
    fn to_object_path(&self, key: &str) -> Result<ObjectPath> {
        validate_key(key)?;
        if is_dir_key(key) {
            parse_path(&format!("{}{}", key, DIR_MARKER))
        } else {
            parse_path(key)
        }
    }

    /// Convert an object location back to a listing entry.
    fn to_entry(meta: &ObjectMeta) -> ListEntry {
        let location = meta.location.as_ref();
        match location.strip_suffix(DIR_MARKER) {
            Some(dir) if dir.ends_with('/') => ListEntry::dir(dir),
            _ => ListEntry::file(
                location,
                meta.size as u64,
                Some(meta.last_modified.timestamp()),
            ),
        }
    }

    /// Segment-aligned path to hand to the store for a listing prefix.
    fn list_root(prefix: &str) -> Result<Option<ObjectPath>> {
        let (dir, _) = split(prefix);
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            Ok(None)
        } else {
            parse_path(dir).map(Some)
        }
    }
}

fn parse_path(key: &str) -> Result<ObjectPath> {
    ObjectPath::parse(key).map_err(|e| StorageError::InvalidPath(format!("{}: {}", key, e)))
}

impl std::fmt::Debug for ObjectStoreBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBucket")
            .field("name", &self.name)
            .field("store", &self.store.to_string())
            .finish()
    }
}

#[async_trait]
impl Bucket for ObjectStoreBucket {
    #[instrument(skip(self), fields(backend = self.name))]
    async fn exists(&self, key: &str) -> Result<bool> {
        let obj_path = self.to_object_path(key)?;

        match self.store.head(&obj_path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::from(e)),
        }
    }

    #[instrument(skip(self), fields(backend = self.name))]
    async fn reader(&self, key: &str) -> Result<ObjectReader> {
        let obj_path = self.to_object_path(key)?;
        if is_dir_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        debug!("Reading from {}://{}", self.name, obj_path);

        match self.store.get(&obj_path).await {
            Ok(result) => Ok(result
                .into_stream()
                .map_err(StorageError::from)
                .boxed()),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::from(e)),
        }
    }

    #[instrument(skip(self, options), fields(backend = self.name))]
    async fn writer(&self, key: &str, options: &WriterOptions) -> Result<ObjectWriter> {
        let obj_path = self.to_object_path(key)?;
        if is_dir_key(key) {
            return Err(StorageError::InvalidPath(format!("{} is a directory", key)));
        }

        debug!("Writing to {}://{}", self.name, obj_path);
        let mut writer = BufWriter::new(Arc::clone(&self.store), obj_path);
        if let Some(content_type) = &options.content_type {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.clone().into());
            writer = writer.with_attributes(attributes);
        }
        Ok(Box::new(writer))
    }

    #[instrument(skip(self), fields(backend = self.name))]
    async fn create_dir(&self, key: &str) -> Result<()> {
        let obj_path = self.to_object_path(key)?;
        if !is_dir_key(key) {
            return Err(StorageError::InvalidPath(format!("{} is not a directory", key)));
        }
        debug!("Writing directory marker {}://{}", self.name, obj_path);
        self.store.put(&obj_path, Bytes::new().into()).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = self.name))]
    async fn delete(&self, key: &str) -> Result<()> {
        let obj_path = self.to_object_path(key)?;
        debug!("Deleting {}://{}", self.name, obj_path);

        // Most stores report success for missing keys; check first so callers see NotFound.
        match self.store.head(&obj_path).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(StorageError::from(e)),
        }

        match self.store.delete(&obj_path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::from(e)),
        }
    }

    #[instrument(skip(self), fields(backend = self.name))]
    async fn list(&self, options: &ListOptions) -> Result<Vec<ListEntry>> {
        let delimited = options.is_delimited()?;
        let prefix = options.prefix_str();
        let root = Self::list_root(prefix)?;
        debug!("Listing {}://{:?}", self.name, root);

        let mut results = Vec::new();
        if delimited {
            let listing = self.store.list_with_delimiter(root.as_ref()).await?;
            for dir in &listing.common_prefixes {
                results.push(ListEntry::dir(format!("{}/", dir.as_ref())));
            }
            results.extend(listing.objects.iter().map(Self::to_entry));
        } else {
            let mut stream = self.store.list(root.as_ref());
            while let Some(meta) = stream.try_next().await? {
                results.push(Self::to_entry(&meta));
            }
        }

        results.retain(|entry| entry.key.starts_with(prefix) && entry.key != prefix);
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results.dedup_by(|a, b| a.key == b.key);
        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        self.name
    }
}
