// Configuration file handling

use crate::persist::PersistOptions;
use crate::storage::Backend;
use crate::store::{DEFAULT_STORAGE_KEY, validate_list_key};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings read from `config.yaml`; every field is optional in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub storage_key: String,
    pub persist: PersistOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: default_data_dir(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            persist: PersistOptions::default(),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = ?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content).context("Failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_list_key(&self.storage_key)
    }
}

/// `<config dir>/tasklist/config.yaml`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tasklist").join("config.yaml"))
}

/// `<data dir>/tasklist`, falling back to `./.tasklist`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("tasklist"))
        .unwrap_or_else(|| PathBuf::from(".tasklist"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::PersistMode;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path().join("config.yaml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.backend, Backend::File);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
backend: sqlite
data_dir: /tmp/tasks
storage_key: "work:tasks"
persist:
  mode: immediate
  debounce_ms: 25
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/tasks"));
        assert_eq!(config.storage_key, "work:tasks");
        assert_eq!(config.persist.mode, PersistMode::Immediate);
        assert_eq!(config.persist.debounce_ms, 25);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::from_yaml("backend: memory\n").unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.persist, PersistOptions::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Config::from_yaml("colour: blue\n").is_err());
        assert!(Config::from_yaml("persist:\n  retries: 3\n").is_err());
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(Config::from_yaml("storage_key: \"has spaces\"\n").is_err());
    }

    #[test]
    fn test_key_too_long_for_backup_rejected() {
        let yaml = format!("storage_key: {}\n", "k".repeat(125));
        assert!(Config::from_yaml(&yaml).is_err());
        let yaml = format!("storage_key: {}\n", "k".repeat(120));
        assert!(Config::from_yaml(&yaml).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "backend: sqlite\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
    }

    #[test]
    fn test_default_paths() {
        assert!(default_data_dir().ends_with("tasklist") || default_data_dir().ends_with(".tasklist"));
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("tasklist/config.yaml"));
        }
    }
}
