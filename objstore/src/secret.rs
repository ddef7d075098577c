//! Credential bundles and the resolvers that fetch them.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};

/// Resolved secret data for one backend.
///
/// Values are kept as raw bytes; the `Debug` output never prints them.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    namespace: String,
    name: String,
    data: BTreeMap<String, Vec<u8>>,
}

impl CredentialBundle {
    /// Create an empty bundle identified by namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data: BTreeMap::new(),
        }
    }

    /// Add a key.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw value for a key.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    /// Value for a key that must be present.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::MissingCredential` naming the key and this secret.
    pub fn require(&self, key: &str) -> Result<&[u8]> {
        self.get(key).ok_or_else(|| StorageError::MissingCredential {
            key: key.to_string(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        })
    }

    /// Value for a key that must be present and valid UTF-8.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        let raw = self.require(key)?;
        std::str::from_utf8(raw).map_err(|_| {
            StorageError::Config(format!(
                "storage secret {}/{} key {} is not valid UTF-8",
                self.namespace, self.name, key
            ))
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Source of credential bundles.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Fetch the secret `name` in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SecretNotFound` if the secret does not exist.
    async fn fetch(&self, namespace: &str, name: &str) -> Result<CredentialBundle>;
}

/// In-memory resolver.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretResolver {
    secrets: HashMap<(String, String), CredentialBundle>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bundle under its own namespace and name.
    pub fn with_secret(mut self, bundle: CredentialBundle) -> Self {
        self.secrets.insert(
            (bundle.namespace.clone(), bundle.name.clone()),
            bundle,
        );
        self
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn fetch(&self, namespace: &str, name: &str) -> Result<CredentialBundle> {
        self.secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

/// Resolver reading secrets laid out as `root/<namespace>/<name>/<KEY>`,
/// one file per key. This is the layout of a mounted Kubernetes secret
/// volume when each secret is projected into its own directory.
#[derive(Debug, Clone)]
pub struct DirectorySecretResolver {
    root: PathBuf,
}

impl DirectorySecretResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SecretResolver for DirectorySecretResolver {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn fetch(&self, namespace: &str, name: &str) -> Result<CredentialBundle> {
        let not_found = || StorageError::SecretNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        if [namespace, name]
            .iter()
            .any(|part| part.is_empty() || part.contains('/') || *part == "..")
        {
            return Err(StorageError::InvalidPath(format!("{}/{}", namespace, name)));
        }

        let dir = self.root.join(namespace).join(name);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        let mut bundle = CredentialBundle::new(namespace, name);
        while let Some(entry) = entries.next_entry().await? {
            let key = entry.file_name().to_string_lossy().to_string();
            // Kubernetes projects keys through "..data" symlinks; skip the bookkeeping entries.
            if key.starts_with('.') || !fs::metadata(entry.path()).await?.is_file() {
                continue;
            }
            let value = fs::read(entry.path()).await?;
            bundle.data.insert(key, value);
        }

        debug!("Loaded {} keys from {:?}", bundle.data.len(), dir);
        Ok(bundle)
    }
}
