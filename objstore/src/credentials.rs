//! Credential materialization.
//!
//! Turns a [`CredentialBundle`] and a [`Backend`] into the settings each
//! transport builder needs. Nothing here touches the network, the
//! filesystem or the process environment: credentials are handed to the
//! transport of one facade instance only, so facades with different
//! credentials can live side by side in one process.

use object_store::{Certificate, ClientOptions};
use std::fmt;
use std::io::BufReader;

use crate::backend::{Backend, Provider};
use crate::error::{Result, StorageError};
use crate::secret::CredentialBundle;

/// S3 access key id.
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// S3 secret access key.
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// PEM-encoded CA certificate(s) for S3-compatible endpoints.
pub const CA_CERT_DATA: &str = "CA_CERT_DATA";
/// GCS service account key (JSON).
pub const GOOGLE_SERVICE_ACCOUNT_JSON_KEY: &str = "GOOGLE_SERVICE_ACCOUNT_JSON_KEY";
/// Azure storage account name.
pub const AZURE_ACCOUNT_NAME: &str = "AZURE_ACCOUNT_NAME";
/// Azure storage account key.
pub const AZURE_ACCOUNT_KEY: &str = "AZURE_ACCOUNT_KEY";

/// A string that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"***\"")
    }
}

/// Client TLS configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// DER-encoded root certificates trusted in addition to the defaults
    pub root_certificates: Vec<Vec<u8>>,
    /// Accept any server certificate
    pub allow_invalid_certificates: bool,
}

impl TlsSettings {
    /// Build TLS settings from optional PEM data and the insecure flag.
    ///
    /// Returns `None` when neither is present so the transport defaults stay
    /// untouched.
    pub fn from_parts(ca_pem: Option<&[u8]>, insecure: bool) -> Result<Option<Self>> {
        let ca_pem = ca_pem.filter(|pem| !pem.is_empty());
        if ca_pem.is_none() && !insecure {
            return Ok(None);
        }

        let mut root_certificates = Vec::new();
        if let Some(pem) = ca_pem {
            let mut reader = BufReader::new(pem);
            root_certificates = rustls_pemfile::certs(&mut reader)
                .map(|cert| cert.map(|der| der.as_ref().to_vec()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    StorageError::Config(format!("failed to parse CA certificate: {}", e))
                })?;
            if root_certificates.is_empty() {
                return Err(StorageError::Config(
                    "failed to parse CA certificate: no certificates found".to_string(),
                ));
            }
        }

        Ok(Some(Self {
            root_certificates,
            allow_invalid_certificates: insecure,
        }))
    }

    /// Apply to transport client options.
    pub fn apply(&self, mut options: ClientOptions) -> Result<ClientOptions> {
        for der in &self.root_certificates {
            let certificate = Certificate::from_der(der).map_err(|e| {
                StorageError::Config(format!("invalid CA certificate: {}", e))
            })?;
            options = options.with_root_certificate(certificate);
        }
        if self.allow_invalid_certificates {
            tracing::warn!("S3 TLS certificate verification disabled - INSECURE");
            options = options.with_allow_invalid_certificates(true);
        }
        Ok(options)
    }
}

/// Static S3 key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Keys {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

/// Everything needed to build an S3 client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Settings {
    /// Static keys; `None` leaves credential discovery to the environment chain
    pub keys: Option<S3Keys>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub tls: Option<TlsSettings>,
}

/// Everything needed to build a GCS client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcsSettings {
    pub service_account_key: Option<SecretString>,
}

/// Azure shared-key account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureAccount {
    pub name: String,
    pub key: SecretString,
}

/// Everything needed to build an Azure client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AzureSettings {
    pub account: Option<AzureAccount>,
}

/// Per-provider authentication settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    S3(S3Settings),
    Gcs(GcsSettings),
    Azure(AzureSettings),
    Local,
}

impl Credentials {
    /// Materialize credentials for `backend` from an optional secret.
    ///
    /// # Errors
    ///
    /// Fails before any connection is attempted when the provider cannot be
    /// resolved, has no transport, a required key is missing from the
    /// secret, or the CA certificate cannot be parsed.
    pub fn materialize(backend: &Backend, secret: Option<&CredentialBundle>) -> Result<Self> {
        match backend.provider()? {
            Provider::S3 => s3_settings(backend, secret).map(Credentials::S3),
            Provider::Gcs => gcs_settings(secret).map(Credentials::Gcs),
            Provider::Azure => azure_settings(secret).map(Credentials::Azure),
            Provider::Local => Ok(Credentials::Local),
            unsupported @ (Provider::Swift | Provider::B2 | Provider::Rest) => {
                Err(StorageError::UnsupportedProvider(unsupported))
            }
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

fn s3_settings(backend: &Backend, secret: Option<&CredentialBundle>) -> Result<S3Settings> {
    let spec = backend.s3_spec()?;

    let keys = match secret {
        Some(secret) => Some(S3Keys {
            access_key_id: secret.require_str(AWS_ACCESS_KEY_ID)?.to_string(),
            secret_access_key: SecretString::new(secret.require_str(AWS_SECRET_ACCESS_KEY)?),
        }),
        None => None,
    };

    let tls = TlsSettings::from_parts(
        secret.and_then(|s| s.get(CA_CERT_DATA)),
        spec.insecure_tls,
    )?;

    Ok(S3Settings {
        keys,
        region: non_empty(spec.region.as_ref()),
        endpoint: non_empty(spec.endpoint.as_ref()),
        tls,
    })
}

fn gcs_settings(secret: Option<&CredentialBundle>) -> Result<GcsSettings> {
    let service_account_key = match secret {
        Some(secret) => Some(SecretString::new(
            secret.require_str(GOOGLE_SERVICE_ACCOUNT_JSON_KEY)?,
        )),
        None => None,
    };
    Ok(GcsSettings {
        service_account_key,
    })
}

fn azure_settings(secret: Option<&CredentialBundle>) -> Result<AzureSettings> {
    let account = match secret {
        Some(secret) => Some(AzureAccount {
            key: SecretString::new(secret.require_str(AZURE_ACCOUNT_KEY)?),
            name: secret.require_str(AZURE_ACCOUNT_NAME)?.to_string(),
        }),
        None => None,
    };
    Ok(AzureSettings { account })
}
