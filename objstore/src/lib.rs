//! Provider-independent object storage.
//!
//! This crate exposes one small facade, [`BlobStorage`], over S3, Google
//! Cloud Storage, Azure Blob Storage and the local filesystem, so callers
//! never branch on the provider they are talking to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  Backend descriptor  +  SecretResolver           │
//! │            │                  │                  │
//! │            └───────┬──────────┘                  │
//! │                    ▼                             │
//! │          ┌───────────────────┐                   │
//! │          │    Credentials    │  ← no I/O         │
//! │          └─────────┬─────────┘                   │
//! │                    ▼                             │
//! │          ┌───────────────────┐                   │
//! │          │   BucketFactory   │  ← prefix scoping │
//! │          └─────────┬─────────┘                   │
//! │                    ▼                             │
//! │        ┌───────────┼────────────┐                │
//! │        ▼           ▼            ▼                │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐          │
//! │  │  Local   │ │  Object  │ │ Prefixed │          │
//! │  │  Bucket  │ │  Store   │ │  Bucket  │          │
//! │  └──────────┘ └──────────┘ └──────────┘          │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Directories
//!
//! Object stores are flat. A key ending in `/` is a directory marker, which
//! lets empty directories exist and be listed with
//! [`BlobStorage::list_dir_n`].
//!
//! On S3, GCS and Azure a marker `a/b/` is stored as the empty object
//! `a/b/` + [`DIR_MARKER`]. Bare `a/b/` objects made by other tools (the
//! provider consoles, older writers) still show up in `list_dir_n`, but are
//! not seen as markers by [`BlobStorage::exists`] and cannot be deleted
//! through this crate; `list` and directory deletes skip them.
//!
//! # Quick Start
//!
//! ```no_run
//! use objstore::{Backend, BlobStorage, CancellationToken, StaticSecretResolver};
//!
//! # async fn example() -> objstore::Result<()> {
//! let backend: Backend = serde_yaml::from_str(
//!     "local:\n  mountPath: /var/backups\n",
//! ).unwrap();
//! let storage = BlobStorage::new(&StaticSecretResolver::new(), "default", &backend).await?;
//! let cancel = CancellationToken::new();
//!
//! storage.mark_as_directory("empty", &cancel).await?;
//! let dirs = storage.list_dir_n("", 0, &cancel).await?;
//! assert!(dirs.contains(&"empty/".to_string()));
//! # Ok(())
//! # }
//! ```

mod backend;
mod blob;
mod credentials;
mod error;
mod factory;
mod local;
pub mod path;
mod prefixed;
mod secret;
mod store;
mod traits;

pub use backend::{
    AzureSpec, B2Spec, Backend, GcsSpec, LocalSpec, Provider, RestServerSpec, S3Spec, SwiftSpec,
};
pub use blob::BlobStorage;
pub use credentials::{
    AzureAccount, AzureSettings, Credentials, GcsSettings, S3Keys, S3Settings, SecretString,
    TlsSettings, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AZURE_ACCOUNT_KEY, AZURE_ACCOUNT_NAME,
    CA_CERT_DATA, GOOGLE_SERVICE_ACCOUNT_JSON_KEY,
};
pub use error::{Result, StorageError};
pub use factory::BucketFactory;
pub use local::LocalBucket;
pub use prefixed::PrefixedBucket;
pub use secret::{CredentialBundle, DirectorySecretResolver, SecretResolver, StaticSecretResolver};
pub use store::{ObjectStoreBucket, DIR_MARKER};
pub use traits::{Bucket, ListEntry, ListOptions, ObjectReader, ObjectWriter, WriterOptions};

// Re-exported for callers of the facade
pub use bytes::Bytes;
pub use tokio_util::sync::CancellationToken;
