//! Configuration for a [`VirtualFileSystem`](crate::VirtualFileSystem).

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::Result;

/// Settings of one file system instance.
///
/// Every field has a default, so a partial JSON document (or `{}`) is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfsConfig {
    /// Prefix prepended to every path to form its storage key.
    /// Distinct prefixes let several file systems share one store.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Root-level directories created (idempotently) on startup.
    #[serde(default = "default_bootstrap_dirs")]
    pub bootstrap_dirs: Vec<String>,

    /// Reject writing a file over a directory and creating a directory over a file.
    #[serde(default)]
    pub strict_types: bool,

    /// Record an intent before recursive rename/delete so that `recover()` can finish it.
    #[serde(default = "default_journal")]
    pub journal: bool,
}

fn default_namespace() -> String {
    "vfs:".to_string()
}

fn default_bootstrap_dirs() -> Vec<String> {
    vec![
        "/Documents".to_string(),
        "/Desktop".to_string(),
        "/Pictures".to_string(),
    ]
}

fn default_journal() -> bool {
    true
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            bootstrap_dirs: default_bootstrap_dirs(),
            strict_types: false,
            journal: default_journal(),
        }
    }
}

impl VfsConfig {
    /// Default settings under a custom namespace.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid vfs config")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON config from a host file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::from_json(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.contains('/') {
            anyhow::bail!("namespace must not contain '/': {:?}", self.namespace);
        }
        if let Some(dir) = self.bootstrap_dirs.iter().find(|d| d.trim().is_empty()) {
            anyhow::bail!("bootstrap directory must not be empty: {:?}", dir);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VfsConfig::default();
        assert_eq!(config.namespace, "vfs:");
        assert_eq!(config.bootstrap_dirs.len(), 3);
        assert!(!config.strict_types);
        assert!(config.journal);
    }

    #[test]
    fn test_partial_json() -> Result<()> {
        let config = VfsConfig::from_json(r#"{"namespace": "notes:", "strict_types": true}"#)?;
        assert_eq!(config.namespace, "notes:");
        assert!(config.strict_types);
        assert_eq!(config.bootstrap_dirs, default_bootstrap_dirs());
        Ok(())
    }

    #[test]
    fn test_empty_json_is_default() -> Result<()> {
        assert_eq!(VfsConfig::from_json("{}")?, VfsConfig::default());
        Ok(())
    }

    #[test]
    fn test_invalid_namespace() {
        assert!(VfsConfig::from_json(r#"{"namespace": "a/b"}"#).is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(VfsConfig::from_json("{namespace").is_err());
    }
}
