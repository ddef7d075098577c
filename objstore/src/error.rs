//! Storage error types.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::backend::Provider;

/// Storage operation errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error during storage operation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid key or path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Object store transport or provider error
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No provider, or more than one, is configured in the backend descriptor
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider resolves but has no transport in this crate
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(Provider),

    /// A credential key required by the provider is missing from the secret
    #[error("Storage secret {namespace}/{name} missing {key} key")]
    MissingCredential {
        key: String,
        namespace: String,
        name: String,
    },

    /// The referenced secret does not exist
    #[error("Storage secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    /// Operation not supported
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Several independent failures collected by one operation
    #[error("{}", AggregateDisplay(.0))]
    Aggregate(Vec<StorageError>),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound(_) => true,
            StorageError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            StorageError::ObjectStore(object_store::Error::NotFound { .. }) => true,
            _ => false,
        }
    }

    /// Check if this error came from caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled)
    }

    /// Check if this error was raised before any network call was made.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            StorageError::Config(_)
                | StorageError::UnknownProvider(_)
                | StorageError::UnsupportedProvider(_)
                | StorageError::MissingCredential { .. }
                | StorageError::SecretNotFound { .. }
                | StorageError::InvalidPath(_)
        )
    }

    /// Collapse collected failures into one result.
    ///
    /// Returns `Ok(())` when nothing failed.
    pub fn aggregate(errors: Vec<StorageError>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Aggregate(errors))
        }
    }
}

struct AggregateDisplay<'a>(&'a [StorageError]);

impl fmt::Display for AggregateDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.0 {
            return write!(f, "{}", only);
        }
        write!(f, "[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        write!(f, "]")
    }
}
