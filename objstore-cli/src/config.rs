use anyhow::{anyhow, Context, Result};
use objstore::Backend;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// CLI configuration, read from TOML or YAML.
///
/// ```toml
/// namespace = "demo"
/// secrets_dir = "~/.objstore/secrets"
///
/// [backend]
/// storageSecretName = "s3-secret"
///
/// [backend.s3]
/// bucket = "backups"
/// endpoint = "http://localhost:9000"
/// prefix = "cluster-a"
///
/// [logging]
/// level = "info"
/// format = "json"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CliConfig {
    /// Namespace the backend's credentials secret lives in
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub backend: Backend,
    /// Root of `<namespace>/<name>/<KEY>` secret files
    #[serde(default)]
    pub secrets_dir: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_format")]
    pub format: String,
    pub file: Option<PathBuf>,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            file: None,
        }
    }
}

/// Default config location (~/.objstore/config.toml)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".objstore").join("config.toml"))
        .ok_or_else(|| anyhow!("Cannot determine home directory"))
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

impl CliConfig {
    /// Load config from a file. `.yaml` and `.yml` files are read as YAML,
    /// everything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::parse(&content, path)?;
        config.expand_paths()?;
        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config = if is_yaml {
            serde_yaml::from_str(content)
                .with_context(|| format!("Invalid YAML config {}", path.display()))?
        } else {
            toml::from_str(content)
                .with_context(|| format!("Invalid TOML config {}", path.display()))?
        };
        Ok(config)
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        if let Some(ref dir) = self.secrets_dir {
            self.secrets_dir = Some(expand_tilde(dir)?);
        }
        if let Some(ref f) = self.logging.file {
            self.logging.file = Some(expand_tilde(f)?);
        }
        if let Some(ref mut local) = self.backend.local {
            local.mount_path = expand_tilde(Path::new(&local.mount_path))?
                .to_string_lossy()
                .to_string();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objstore::Provider;
    use tempfile::TempDir;

    #[test]
    fn test_load_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
namespace = "demo"

[backend]
storageSecretName = "s3-secret"

[backend.s3]
bucket = "backups"
endpoint = "http://localhost:9000"
insecureTLS = true
"#,
        )
        .unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.namespace, "demo");
        assert_eq!(config.backend.provider().unwrap(), Provider::S3);
        assert!(config.backend.insecure_tls());
        assert_eq!(config.backend.storage_secret_name.as_deref(), Some("s3-secret"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(
            &path,
            "backend:\n  local:\n    mountPath: /var/backups\nlogging:\n  level: debug\n  format: json\n",
        )
        .unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.backend.container().unwrap(), "/var/backups");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_invalid_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "namespace = ").unwrap();
        assert!(CliConfig::load(&path).is_err());
        assert!(CliConfig::load(&temp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let plain = expand_tilde(Path::new("/etc/objstore")).unwrap();
        assert_eq!(plain, PathBuf::from("/etc/objstore"));
    }
}
