// src/config.rs

//! Runtime configuration
//!
//! TOML file with two sections:
//! - `[warehouse]` - local root, remote locator, load deadline
//! - `[package]` - namespace, default version, tombstone TTL
//!
//! ```toml
//! [warehouse]
//! local = "/opt/warehouse"
//! remote = "s3://artifacts/modules"
//! load_timeout_secs = 120
//!
//! [package]
//! namespace = "default"
//! default_version = "default"
//! negative_ttl_secs = 300
//! ```
//!
//! Shape violations are reported as [`Error::InvalidIdentity`] and are
//! meant to stop the process at startup.

use crate::allowed::{self, AllowedKind};
use crate::error::{Error, Result};
use crate::layout::ArtifactLayout;
use crate::package::{NAMESPACE_DEFAULT, VERSION_DEFAULT};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub warehouse: WarehouseSection,

    #[serde(default)]
    pub package: PackageSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseSection {
    /// Local warehouse root; unset disables the warehouse, empty selects
    /// the platform default
    #[serde(default)]
    pub local: Option<String>,

    /// Remote locator (`s3://bucket/prefix` or `file:///path`)
    #[serde(default)]
    pub remote: Option<String>,

    /// Deadline for one module load, including remote sync
    #[serde(default)]
    pub load_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_version")]
    pub default_version: String,

    /// Tombstone lifetime; unset keeps tombstones until closed
    #[serde(default)]
    pub negative_ttl_secs: Option<u64>,
}

impl Default for PackageSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            default_version: default_version(),
            negative_ttl_secs: None,
        }
    }
}

fn default_namespace() -> String {
    NAMESPACE_DEFAULT.to_string()
}

fn default_version() -> String {
    VERSION_DEFAULT.to_string()
}

impl Config {
    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content).map_err(|e| match e {
            Error::ConfigError(msg) => {
                Error::ConfigError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(local) = &self.warehouse.local {
            allowed::require(AllowedKind::Path, "warehouse.local", local)?;
        }
        if let Some(remote) = &self.warehouse.remote {
            if remote.is_empty() {
                return Err(Error::InvalidIdentity(
                    "warehouse.remote must not be empty".to_string(),
                ));
            }
            allowed::require(AllowedKind::Url, "warehouse.remote", remote)?;
            if self.warehouse.local.is_none() {
                return Err(Error::ConfigError(
                    "warehouse.remote requires warehouse.local".to_string(),
                ));
            }
        }
        if self.warehouse.load_timeout_secs == Some(0) {
            return Err(Error::ConfigError(
                "warehouse.load_timeout_secs must be positive".to_string(),
            ));
        }

        allowed::require_keyword("package.namespace", &self.package.namespace)?;
        allowed::require_keyword("package.default_version", &self.package.default_version)?;
        Ok(())
    }

    /// Resolved local warehouse root, if a warehouse is configured
    pub fn local_root(&self) -> Option<PathBuf> {
        match self.warehouse.local.as_deref() {
            None => None,
            Some("") => Some(ArtifactLayout::default_root()),
            Some(local) => Some(PathBuf::from(local)),
        }
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.warehouse.load_timeout_secs.map(Duration::from_secs)
    }

    pub fn negative_ttl(&self) -> Option<Duration> {
        self.package.negative_ttl_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.warehouse.local.is_none());
        assert!(config.local_root().is_none());
        assert_eq!(config.package.namespace, "default");
        assert_eq!(config.package.default_version, "default");
        assert!(config.negative_ttl().is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
[warehouse]
local = "/srv/modules"
remote = "s3://artifacts/modules"
load_timeout_secs = 120

[package]
namespace = "payments"
default_version = "v1"
negative_ttl_secs = 300
"#,
        )
        .unwrap();

        assert_eq!(config.local_root(), Some(PathBuf::from("/srv/modules")));
        assert_eq!(config.load_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.negative_ttl(), Some(Duration::from_secs(300)));
        assert_eq!(config.package.namespace, "payments");
    }

    #[test]
    fn test_empty_local_selects_platform_root() {
        let config = Config::parse("[warehouse]\nlocal = \"\"\n").unwrap();
        assert_eq!(config.local_root(), Some(ArtifactLayout::default_root()));
    }

    #[test]
    fn test_shape_violations_are_invalid_identity() {
        let err = Config::parse("[warehouse]\nlocal = \"modules\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity(_)));

        let err = Config::parse("[warehouse]\nlocal = \"/x\"\nremote = \"bucket\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity(_)));

        let err = Config::parse("[package]\nnamespace = \"Pay Ments\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity(_)));
    }

    #[test]
    fn test_remote_without_local_is_rejected() {
        let err = Config::parse("[warehouse]\nremote = \"s3://artifacts\"\n").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Config::parse("[warehouse]\nlocl = \"/x\"\n").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_load_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dynamod.toml");
        std::fs::write(&path, "[package]\ndefault_version = \"v2\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.package.default_version, "v2");

        let err = Config::load(&temp_dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
