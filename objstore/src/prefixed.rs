//! Prefix-scoped bucket.
//!
//! Wraps another bucket so that every key is resolved below a fixed prefix.
//! Keys handed in are relative to the prefix, keys handed out have it
//! stripped, and nothing outside the prefix is reachable.

use async_trait::async_trait;
use tracing::instrument;

use crate::error::Result;
use crate::path::{validate_dir, validate_key};
use crate::traits::{Bucket, ListEntry, ListOptions, ObjectReader, ObjectWriter, WriterOptions};

/// Bucket view restricted to keys under `prefix`.
pub struct PrefixedBucket {
    inner: Box<dyn Bucket>,
    prefix: String,
}

impl PrefixedBucket {
    /// Scope `inner` to `prefix`. A missing trailing `/` is added.
    pub fn new(inner: Box<dyn Bucket>, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { inner, prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        Ok(format!("{}{}", self.prefix, key))
    }
}

impl std::fmt::Debug for PrefixedBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixedBucket")
            .field("backend", &self.inner.backend_name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[async_trait]
impl Bucket for PrefixedBucket {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(&self.full_key(key)?).await
    }

    async fn reader(&self, key: &str) -> Result<ObjectReader> {
        self.inner.reader(&self.full_key(key)?).await
    }

    async fn writer(&self, key: &str, options: &WriterOptions) -> Result<ObjectWriter> {
        self.inner.writer(&self.full_key(key)?, options).await
    }

    async fn create_dir(&self, key: &str) -> Result<()> {
        self.inner.create_dir(&self.full_key(key)?).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(&self.full_key(key)?).await
    }

    #[instrument(skip(self), fields(prefix = %self.prefix))]
    async fn list(&self, options: &ListOptions) -> Result<Vec<ListEntry>> {
        validate_dir(options.prefix_str())?;
        let scoped = ListOptions {
            prefix: Some(format!("{}{}", self.prefix, options.prefix_str())),
            delimiter: options.delimiter.clone(),
        };

        let entries = self.inner.list(&scoped).await?;
        Ok(entries
            .into_iter()
            .filter_map(|mut entry| {
                let relative = entry.key.strip_prefix(&self.prefix)?;
                if relative.is_empty() {
                    return None;
                }
                entry.key = relative.to_string();
                Some(entry)
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectStoreBucket;
    use futures::TryStreamExt;
    use object_store::memory::InMemory;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    async fn put(bucket: &dyn Bucket, key: &str, data: &[u8]) {
        let mut writer = bucket.writer(key, &WriterOptions::default()).await.unwrap();
        writer.write_all(data).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    fn scoped(store: &Arc<InMemory>, prefix: &str) -> PrefixedBucket {
        PrefixedBucket::new(
            Box::new(ObjectStoreBucket::new(store.clone(), "memory")),
            prefix,
        )
    }

    #[tokio::test]
    async fn test_keys_resolve_under_prefix() {
        let store = Arc::new(InMemory::new());
        let bucket = scoped(&store, "tenant-a");
        assert_eq!(bucket.prefix(), "tenant-a/");

        put(&bucket, "data/sample.txt", b"sample").await;

        let root = ObjectStoreBucket::new(store.clone(), "memory");
        assert!(root.exists("tenant-a/data/sample.txt").await.unwrap());
        assert!(bucket.exists("data/sample.txt").await.unwrap());

        let chunks: Vec<bytes::Bytes> = bucket
            .reader("data/sample.txt")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"sample");
    }

    #[tokio::test]
    async fn test_list_strips_prefix_and_isolates() {
        let store = Arc::new(InMemory::new());
        let a = scoped(&store, "a/");
        let ab = scoped(&store, "ab/");

        put(&a, "one.txt", b"1").await;
        put(&a, "nested/two.txt", b"2").await;
        put(&ab, "other.txt", b"3").await;

        let entries = a.list(&ListOptions::flat("")).await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["nested/two.txt", "one.txt"]);

        let level = a.list(&ListOptions::delimited("")).await.unwrap();
        let keys: Vec<_> = level.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["nested/", "one.txt"]);

        assert!(!ab.exists("one.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_scope_marker_is_hidden() {
        let store = Arc::new(InMemory::new());
        let root = ObjectStoreBucket::new(store.clone(), "memory");
        root.create_dir("scope/").await.unwrap();

        let bucket = scoped(&store, "scope/");
        assert!(bucket.list(&ListOptions::flat("")).await.unwrap().is_empty());
        assert!(bucket.exists("").await.is_err());
    }

    #[tokio::test]
    async fn test_list_cannot_leave_prefix() {
        let store = Arc::new(InMemory::new());
        put(&scoped(&store, "b"), "f.txt", b"secret of b").await;

        let a = scoped(&store, "a");
        let err = a.list(&ListOptions::flat("../b/")).await.unwrap_err();
        assert!(matches!(err, crate::error::StorageError::InvalidPath(_)));
        assert!(a.exists("../b/f.txt").await.is_err());
    }
}
