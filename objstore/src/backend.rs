//! Backend descriptors.
//!
//! A [`Backend`] names exactly one storage provider together with its
//! connection parameters and, optionally, the secret holding its
//! credentials. The shape follows the Kubernetes-style resources these
//! descriptors usually come from, so it deserializes from camelCase YAML:
//!
//! ```yaml
//! storageSecretName: s3-secret
//! s3:
//!   bucket: backups
//!   prefix: /cluster-a
//!   endpoint: https://s3.us-east-2.amazonaws.com
//!   region: us-east-2
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StorageError};

/// Provider selected by a [`Backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Amazon S3 and S3-compatible services (MinIO, Ceph RGW, ...)
    S3,
    /// Google Cloud Storage
    Gcs,
    /// Azure Blob Storage
    Azure,
    /// Local (or mounted) filesystem
    Local,
    /// OpenStack Swift
    Swift,
    /// Backblaze B2
    B2,
    /// REST server
    Rest,
}

impl Provider {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::S3 => "s3",
            Provider::Gcs => "gcs",
            Provider::Azure => "azure",
            Provider::Local => "local",
            Provider::Swift => "swift",
            Provider::B2 => "b2",
            Provider::Rest => "rest",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// S3 connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Spec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Skip server certificate verification
    #[serde(default, rename = "insecureTLS")]
    pub insecure_tls: bool,
}

/// Google Cloud Storage connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsSpec {
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub max_connections: i64,
}

/// Azure Blob Storage connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureSpec {
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub max_connections: i64,
}

/// Local filesystem parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSpec {
    /// Directory acting as the bucket root
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// OpenStack Swift parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwiftSpec {
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Backblaze B2 parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct B2Spec {
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub max_connections: i64,
}

/// REST server parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestServerSpec {
    pub url: String,
}

/// Storage backend descriptor.
///
/// Exactly one of the provider fields must be set; [`Backend::provider`]
/// rejects empty and ambiguous descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// Name of the secret holding provider credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Spec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift: Option<SwiftSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b2: Option<B2Spec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<RestServerSpec>,
}

impl Backend {
    /// Descriptor for an S3 bucket.
    pub fn s3(spec: S3Spec) -> Self {
        Self {
            s3: Some(spec),
            ..Default::default()
        }
    }

    /// Descriptor for a GCS bucket.
    pub fn gcs(spec: GcsSpec) -> Self {
        Self {
            gcs: Some(spec),
            ..Default::default()
        }
    }

    /// Descriptor for an Azure container.
    pub fn azure(spec: AzureSpec) -> Self {
        Self {
            azure: Some(spec),
            ..Default::default()
        }
    }

    /// Descriptor for a local directory.
    pub fn local(mount_path: impl Into<String>) -> Self {
        Self {
            local: Some(LocalSpec {
                mount_path: mount_path.into(),
                prefix: None,
            }),
            ..Default::default()
        }
    }

    /// Set the credentials secret name.
    pub fn with_secret(mut self, name: impl Into<String>) -> Self {
        self.storage_secret_name = Some(name.into());
        self
    }

    /// Resolve the configured provider.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UnknownProvider` when no provider, or more than
    /// one, is set.
    pub fn provider(&self) -> Result<Provider> {
        let configured: Vec<Provider> = [
            (self.s3.is_some(), Provider::S3),
            (self.gcs.is_some(), Provider::Gcs),
            (self.azure.is_some(), Provider::Azure),
            (self.local.is_some(), Provider::Local),
            (self.swift.is_some(), Provider::Swift),
            (self.b2.is_some(), Provider::B2),
            (self.rest.is_some(), Provider::Rest),
        ]
        .into_iter()
        .filter_map(|(set, provider)| set.then_some(provider))
        .collect();

        match configured.as_slice() {
            [provider] => Ok(*provider),
            [] => Err(StorageError::UnknownProvider(
                "no storage provider is configured".to_string(),
            )),
            many => Err(StorageError::UnknownProvider(format!(
                "multiple storage providers are configured: {}",
                many.iter()
                    .map(Provider::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Bucket or container name. For local backends this is the mount path,
    /// for REST servers the host and port of the URL.
    pub fn container(&self) -> Result<String> {
        Ok(match self.provider()? {
            Provider::S3 => self.s3_spec()?.bucket.clone(),
            Provider::Gcs => self.gcs_spec()?.bucket.clone(),
            Provider::Azure => self.azure_spec()?.container.clone(),
            Provider::Local => self.local_spec()?.mount_path.clone(),
            Provider::Swift => self.swift_spec()?.container.clone(),
            Provider::B2 => self.b2_spec()?.bucket.clone(),
            Provider::Rest => {
                let url = self.rest_url()?;
                match (url.host_str(), url.port()) {
                    (Some(host), Some(port)) => format!("{}:{}", host, port),
                    (Some(host), None) => host.to_string(),
                    (None, _) => {
                        return Err(StorageError::Config(format!(
                            "rest server url {} has no host",
                            url
                        )))
                    }
                }
            }
        })
    }

    /// Provider-qualified location, e.g. `s3:backups` or `gs:backups`.
    ///
    /// REST servers have no location.
    pub fn location(&self) -> Result<String> {
        let provider = self.provider()?;
        let scheme = match provider {
            Provider::Gcs => "gs",
            Provider::Rest => {
                return Err(StorageError::Config(
                    "rest backends have no location".to_string(),
                ))
            }
            other => other.as_str(),
        };
        Ok(format!("{}:{}", scheme, self.container()?))
    }

    /// Key prefix inside the bucket. Empty when none is configured.
    pub fn prefix(&self) -> Result<String> {
        Ok(match self.provider()? {
            Provider::S3 => self.s3_spec()?.prefix.clone().unwrap_or_default(),
            Provider::Gcs => self.gcs_spec()?.prefix.clone().unwrap_or_default(),
            Provider::Azure => self.azure_spec()?.prefix.clone().unwrap_or_default(),
            Provider::Local => self.local_spec()?.prefix.clone().unwrap_or_default(),
            Provider::Swift => self.swift_spec()?.prefix.clone().unwrap_or_default(),
            Provider::B2 => self.b2_spec()?.prefix.clone().unwrap_or_default(),
            Provider::Rest => self.rest_url()?.path().to_string(),
        })
    }

    /// Connection limit; 0 when unset or not supported by the provider.
    pub fn max_connections(&self) -> i64 {
        if let Some(gcs) = &self.gcs {
            return gcs.max_connections;
        }
        if let Some(azure) = &self.azure {
            return azure.max_connections;
        }
        if let Some(b2) = &self.b2 {
            return b2.max_connections;
        }
        0
    }

    /// Service endpoint, only defined for S3 and REST backends.
    pub fn endpoint(&self) -> Option<String> {
        if let Some(s3) = &self.s3 {
            return Some(s3.endpoint.clone().unwrap_or_default());
        }
        self.rest.as_ref().map(|rest| rest.url.clone())
    }

    /// Region, only defined for S3 backends.
    pub fn region(&self) -> Option<String> {
        self.s3
            .as_ref()
            .map(|s3| s3.region.clone().unwrap_or_default())
    }

    /// Whether server certificate verification is disabled.
    pub fn insecure_tls(&self) -> bool {
        self.s3.as_ref().is_some_and(|s3| s3.insecure_tls)
    }

    pub(crate) fn s3_spec(&self) -> Result<&S3Spec> {
        self.s3.as_ref().ok_or_else(|| missing_spec(Provider::S3))
    }

    pub(crate) fn gcs_spec(&self) -> Result<&GcsSpec> {
        self.gcs.as_ref().ok_or_else(|| missing_spec(Provider::Gcs))
    }

    pub(crate) fn azure_spec(&self) -> Result<&AzureSpec> {
        self.azure.as_ref().ok_or_else(|| missing_spec(Provider::Azure))
    }

    pub(crate) fn local_spec(&self) -> Result<&LocalSpec> {
        self.local.as_ref().ok_or_else(|| missing_spec(Provider::Local))
    }

    fn swift_spec(&self) -> Result<&SwiftSpec> {
        self.swift.as_ref().ok_or_else(|| missing_spec(Provider::Swift))
    }

    fn b2_spec(&self) -> Result<&B2Spec> {
        self.b2.as_ref().ok_or_else(|| missing_spec(Provider::B2))
    }

    fn rest_url(&self) -> Result<url::Url> {
        let rest = self.rest.as_ref().ok_or_else(|| missing_spec(Provider::Rest))?;
        url::Url::parse(&rest.url).map_err(|e| {
            StorageError::Config(format!("invalid rest server url {}: {}", rest.url, e))
        })
    }
}

fn missing_spec(provider: Provider) -> StorageError {
    StorageError::Config(format!("backend has no {} spec", provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Case {
        name: &'static str,
        backend: Backend,
        container: &'static str,
        location: Option<&'static str>,
        prefix: &'static str,
        provider: Provider,
        max_connections: i64,
        endpoint: Option<&'static str>,
        region: Option<&'static str>,
    }

    fn cases() -> Vec<Case> {
        vec![
            Case {
                name: "b2",
                backend: Backend {
                    b2: Some(B2Spec {
                        bucket: "stash-backup".to_string(),
                        prefix: Some("/source/data".to_string()),
                        max_connections: 2,
                    }),
                    storage_secret_name: Some("b2-secret".to_string()),
                    ..Default::default()
                },
                container: "stash-backup",
                location: Some("b2:stash-backup"),
                prefix: "/source/data",
                provider: Provider::B2,
                max_connections: 2,
                endpoint: None,
                region: None,
            },
            Case {
                name: "local",
                backend: Backend::local("/safe/data").with_secret("local-secret"),
                container: "/safe/data",
                location: Some("local:/safe/data"),
                prefix: "",
                provider: Provider::Local,
                max_connections: 0,
                endpoint: None,
                region: None,
            },
            Case {
                name: "s3",
                backend: Backend::s3(S3Spec {
                    bucket: "stash-backup".to_string(),
                    prefix: Some("/source/data".to_string()),
                    endpoint: Some("s3.amazonaws.com".to_string()),
                    ..Default::default()
                })
                .with_secret("s3-secret"),
                container: "stash-backup",
                location: Some("s3:stash-backup"),
                prefix: "/source/data",
                provider: Provider::S3,
                max_connections: 0,
                endpoint: Some("s3.amazonaws.com"),
                region: Some(""),
            },
            Case {
                name: "s3_with_region",
                backend: Backend::s3(S3Spec {
                    bucket: "stash-backup".to_string(),
                    prefix: Some("/source/data".to_string()),
                    endpoint: Some("s3.amazonaws.com".to_string()),
                    region: Some("my.custom.region".to_string()),
                    ..Default::default()
                }),
                container: "stash-backup",
                location: Some("s3:stash-backup"),
                prefix: "/source/data",
                provider: Provider::S3,
                max_connections: 0,
                endpoint: Some("s3.amazonaws.com"),
                region: Some("my.custom.region"),
            },
            Case {
                name: "gcs",
                backend: Backend::gcs(GcsSpec {
                    bucket: "stash-backup".to_string(),
                    prefix: Some("/source/data".to_string()),
                    max_connections: 2,
                }),
                container: "stash-backup",
                location: Some("gs:stash-backup"),
                prefix: "/source/data",
                provider: Provider::Gcs,
                max_connections: 2,
                endpoint: None,
                region: None,
            },
            Case {
                name: "azure",
                backend: Backend::azure(AzureSpec {
                    container: "stash-backup".to_string(),
                    prefix: Some("/source/data".to_string()),
                    max_connections: 2,
                }),
                container: "stash-backup",
                location: Some("azure:stash-backup"),
                prefix: "/source/data",
                provider: Provider::Azure,
                max_connections: 2,
                endpoint: None,
                region: None,
            },
            Case {
                name: "swift",
                backend: Backend {
                    swift: Some(SwiftSpec {
                        container: "stash-backup".to_string(),
                        prefix: Some("/source/data".to_string()),
                    }),
                    ..Default::default()
                },
                container: "stash-backup",
                location: Some("swift:stash-backup"),
                prefix: "/source/data",
                provider: Provider::Swift,
                max_connections: 0,
                endpoint: None,
                region: None,
            },
            Case {
                name: "rest",
                backend: Backend {
                    rest: Some(RestServerSpec {
                        url: "http://rest-server.demo.svc:8000/stash-backup".to_string(),
                    }),
                    ..Default::default()
                },
                container: "rest-server.demo.svc:8000",
                location: None,
                prefix: "/stash-backup",
                provider: Provider::Rest,
                max_connections: 0,
                endpoint: Some("http://rest-server.demo.svc:8000/stash-backup"),
                region: None,
            },
        ]
    }

    #[test]
    fn test_accessors() {
        for case in cases() {
            let b = &case.backend;
            assert_eq!(b.provider().unwrap(), case.provider, "{}", case.name);
            assert_eq!(b.container().unwrap(), case.container, "{}", case.name);
            assert_eq!(b.location().ok().as_deref(), case.location, "{}", case.name);
            assert_eq!(b.prefix().unwrap(), case.prefix, "{}", case.name);
            assert_eq!(b.max_connections(), case.max_connections, "{}", case.name);
            assert_eq!(b.endpoint().as_deref(), case.endpoint, "{}", case.name);
            assert_eq!(b.region().as_deref(), case.region, "{}", case.name);
        }
    }

    #[test]
    fn test_provider_none() {
        let err = Backend::default().provider().unwrap_err();
        assert!(matches!(err, StorageError::UnknownProvider(_)));
        assert!(err.is_config());
    }

    #[test]
    fn test_provider_ambiguous() {
        let mut backend = Backend::local("/data");
        backend.gcs = Some(GcsSpec {
            bucket: "b".to_string(),
            ..Default::default()
        });
        let err = backend.provider().unwrap_err();
        assert!(err.to_string().contains("gcs, local"));
    }

    #[test]
    fn test_deserialize_yaml() {
        let yaml = r#"
storageSecretName: s3-secret
s3:
  bucket: kubestash
  prefix: unitTest
  endpoint: https://s3.us-east-2.amazonaws.com
  region: us-east-2
  insecureTLS: true
"#;
        let backend: Backend = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(backend.provider().unwrap(), Provider::S3);
        assert_eq!(backend.storage_secret_name.as_deref(), Some("s3-secret"));
        assert!(backend.insecure_tls());
        assert_eq!(backend.region().as_deref(), Some("us-east-2"));
    }

    #[test]
    fn test_serialize_skips_unset_providers() {
        let json = serde_json::to_string(&Backend::local("/data")).unwrap();
        assert_eq!(json, r#"{"local":{"mountPath":"/data"}}"#);
    }
}
