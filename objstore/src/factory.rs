//! Bucket factory.
//!
//! Turns a backend descriptor plus materialized credentials into opened,
//! prefix-scoped [`Bucket`] handles. Provider dispatch happens once, in
//! [`BucketFactory::new`].
//!
//! # Prefix scoping
//!
//! A handle opened for `dir` is scoped to
//! `trim(clean_join(backend_prefix, dir), "/") + "/"`. When that is the
//! bucket root the raw handle is returned, otherwise it is wrapped in a
//! [`PrefixedBucket`].

use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::{ClientOptions, ObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::backend::{Backend, Provider};
use crate::credentials::{AzureSettings, Credentials, GcsSettings, S3Settings};
use crate::error::{Result, StorageError};
use crate::local::LocalBucket;
use crate::path::{scope_prefix, validate_dir};
use crate::prefixed::PrefixedBucket;
use crate::store::ObjectStoreBucket;
use crate::traits::Bucket;

/// How handles are obtained.
#[derive(Clone)]
enum Connection {
    /// S3 clients are built on every open.
    S3 {
        bucket: String,
        settings: S3Settings,
        max_connections: i64,
    },
    /// Pre-built store shared by every handle.
    Store {
        store: Arc<dyn ObjectStore>,
        name: &'static str,
    },
    /// Local directory.
    Local { root: PathBuf },
}

/// Opens scoped bucket handles for one backend.
#[derive(Clone)]
pub struct BucketFactory {
    connection: Connection,
    base_prefix: String,
    storage_url: String,
}

impl BucketFactory {
    /// Create a factory for `backend` using `credentials`.
    ///
    /// GCS and Azure transports are built here, so bad service account keys
    /// or account settings fail before any operation runs.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UnsupportedProvider` for providers without a
    /// transport and `StorageError::Config` when the credentials do not
    /// belong to the backend's provider or the transport cannot be built.
    pub fn new(backend: &Backend, credentials: Credentials) -> Result<Self> {
        let max_connections = backend.max_connections();

        let (connection, storage_url) = match (backend.provider()?, credentials) {
            (Provider::S3, Credentials::S3(settings)) => {
                let bucket = backend.s3_spec()?.bucket.clone();
                let url = format!("s3://{}", bucket);
                let connection = Connection::S3 {
                    bucket,
                    settings,
                    max_connections,
                };
                (connection, url)
            }
            (Provider::Gcs, Credentials::Gcs(settings)) => {
                let bucket = &backend.gcs_spec()?.bucket;
                let store = build_gcs(bucket, &settings, max_connections)?;
                let connection = Connection::Store { store, name: "gcs" };
                (connection, format!("gs://{}", bucket))
            }
            (Provider::Azure, Credentials::Azure(settings)) => {
                let container = &backend.azure_spec()?.container;
                let store = build_azure(container, &settings, max_connections)?;
                let connection = Connection::Store {
                    store,
                    name: "azure",
                };
                (connection, format!("azblob://{}", container))
            }
            (Provider::Local, Credentials::Local) => {
                let mount_path = backend.local_spec()?.mount_path.clone();
                let url = format!("file:///{}", mount_path.trim_start_matches('/'));
                let connection = Connection::Local {
                    root: PathBuf::from(mount_path),
                };
                (connection, url)
            }
            (provider @ (Provider::Swift | Provider::B2 | Provider::Rest), _) => {
                return Err(StorageError::UnsupportedProvider(provider))
            }
            (provider, credentials) => {
                return Err(StorageError::Config(format!(
                    "{:?} credentials cannot be used with a {} backend",
                    credentials, provider
                )))
            }
        };

        Ok(Self {
            connection,
            base_prefix: backend.prefix()?,
            storage_url,
        })
    }

    /// Create a factory over an existing store, scoped to `prefix`.
    pub fn from_store(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        let storage_url = store.to_string();
        Self {
            connection: Connection::Store {
                store,
                name: "object_store",
            },
            base_prefix: prefix.into(),
            storage_url,
        }
    }

    /// Location of the underlying bucket, for logs.
    pub fn storage_url(&self) -> &str {
        &self.storage_url
    }

    /// Prefix every handle is scoped under.
    pub fn base_prefix(&self) -> &str {
        &self.base_prefix
    }

    /// Open a handle scoped to `dir` under the backend prefix.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` if `dir` has a `..` segment.
    #[instrument(skip(self), fields(url = %self.storage_url))]
    pub async fn open(&self, dir: &str) -> Result<Box<dyn Bucket>> {
        validate_dir(dir)?;
        let bucket: Box<dyn Bucket> = match &self.connection {
            Connection::S3 {
                bucket,
                settings,
                max_connections,
            } => {
                let store = build_s3(bucket, settings, *max_connections)?;
                Box::new(ObjectStoreBucket::new(store, "s3"))
            }
            Connection::Store { store, name } => {
                Box::new(ObjectStoreBucket::new(Arc::clone(store), *name))
            }
            Connection::Local { root } => Box::new(LocalBucket::open(root.clone()).await?),
        };

        match scope_prefix(&self.base_prefix, dir) {
            None => {
                debug!("Opened bucket at root");
                Ok(bucket)
            }
            Some(prefix) => {
                debug!("Opened bucket at {}", prefix);
                Ok(Box::new(PrefixedBucket::new(bucket, prefix)))
            }
        }
    }

    /// Close a handle. Failures are logged, never returned.
    pub async fn close(bucket: Box<dyn Bucket>) {
        if let Err(e) = bucket.close().await {
            error!(error = %e, backend = bucket.backend_name(), "failed to close bucket");
        }
    }
}

impl std::fmt::Debug for BucketFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketFactory")
            .field("storage_url", &self.storage_url)
            .field("base_prefix", &self.base_prefix)
            .finish()
    }
}

fn client_options(max_connections: i64) -> ClientOptions {
    let options = ClientOptions::new();
    match usize::try_from(max_connections) {
        Ok(limit) if limit > 0 => options.with_pool_max_idle_per_host(limit),
        _ => options,
    }
}

fn build_error(provider: Provider, e: object_store::Error) -> StorageError {
    StorageError::Config(format!("failed to build {} client: {}", provider, e))
}

fn build_s3(
    bucket: &str,
    settings: &S3Settings,
    max_connections: i64,
) -> Result<Arc<dyn ObjectStore>> {
    let mut options = client_options(max_connections);
    if let Some(tls) = &settings.tls {
        options = tls.apply(options)?;
    }
    if settings
        .endpoint
        .as_deref()
        .is_some_and(|endpoint| endpoint.starts_with("http://"))
    {
        options = options.with_allow_http(true);
    }

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_virtual_hosted_style_request(false)
        .with_client_options(options);

    if let Some(region) = &settings.region {
        builder = builder.with_region(region);
    }
    if let Some(endpoint) = &settings.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if let Some(keys) = &settings.keys {
        builder = builder
            .with_access_key_id(&keys.access_key_id)
            .with_secret_access_key(keys.secret_access_key.expose());
    }

    let store = builder.build().map_err(|e| build_error(Provider::S3, e))?;
    Ok(Arc::new(store))
}

fn build_gcs(
    bucket: &str,
    settings: &GcsSettings,
    max_connections: i64,
) -> Result<Arc<dyn ObjectStore>> {
    let mut builder = GoogleCloudStorageBuilder::from_env()
        .with_bucket_name(bucket)
        .with_client_options(client_options(max_connections));

    if let Some(key) = &settings.service_account_key {
        builder = builder.with_service_account_key(key.expose());
    }

    let store = builder.build().map_err(|e| build_error(Provider::Gcs, e))?;
    Ok(Arc::new(store))
}

fn build_azure(
    container: &str,
    settings: &AzureSettings,
    max_connections: i64,
) -> Result<Arc<dyn ObjectStore>> {
    let mut builder = MicrosoftAzureBuilder::from_env()
        .with_container_name(container)
        .with_client_options(client_options(max_connections));

    if let Some(account) = &settings.account {
        builder = builder
            .with_account(&account.name)
            .with_access_key(account.key.expose());
    }

    let store = builder.build().map_err(|e| build_error(Provider::Azure, e))?;
    Ok(Arc::new(store))
}
