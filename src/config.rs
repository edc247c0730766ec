use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};

use crate::storage::{LocalObjectStore, MemoryObjectStore, ObjectStore};

pub const DEFAULT_CONFIG_FILE: &str = "filedrive.toml";
pub const MAX_OBJECT_SIZE: u64 = 1024 * 1024 * 1024; // 1GB

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Record files under the data directory.
    Local,
    /// Process memory only; nothing is kept between runs.
    Memory,
}

/// Names the table an object store reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: Backend,
    pub database_name: String,
    pub store_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            database_name: "filedrive".to_string(),
            store_name: "files".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub email: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            email: "admin@localhost".to_string(),
            password: "changeme".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub data_directory: PathBuf,
    pub auto_create_directories: bool,
    pub max_object_size: u64,
    pub log_filter: String,
    pub store: StoreConfig,
    pub auth: AuthConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./data"),
            auto_create_directories: true,
            max_object_size: MAX_OBJECT_SIZE,
            log_filter: "filedrive=info".to_string(),
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl DriveConfig {
    /// Read `config_path` (default `filedrive.toml`), writing the defaults
    /// there first if the file does not exist.
    pub fn load_or_create(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        if Path::new(config_file).exists() {
            let content = std::fs::read_to_string(config_file)
                .with_context(|| format!("failed to read config: {}", config_file))?;
            let config: DriveConfig = toml::from_str(&content)
                .with_context(|| format!("failed to parse config: {}", config_file))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(config_file)?;
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)
            .with_context(|| format!("failed to write config: {}", config_path))?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if self.auto_create_directories
            && self.store.backend == Backend::Local
            && !self.data_directory.exists()
        {
            std::fs::create_dir_all(&self.data_directory).with_context(|| {
                format!(
                    "failed to create data directory: {}",
                    self.data_directory.display()
                )
            })?;
            tracing::info!(path = %self.data_directory.display(), "created data directory");
        }
        Ok(())
    }

    /// Build the object store this configuration describes.
    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        match self.store.backend {
            Backend::Local => Arc::new(LocalObjectStore::new(&self.data_directory, &self.store)),
            Backend::Memory => Arc::new(MemoryObjectStore::new(&self.store)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_or_create_writes_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("drive.toml");
        let path_str = path.to_str().unwrap();

        let config = DriveConfig::load_or_create(Some(path_str)).unwrap();
        assert!(path.exists());
        assert_eq!(config.store, StoreConfig::default());

        let reloaded = DriveConfig::load_or_create(Some(path_str)).unwrap();
        assert_eq!(reloaded.data_directory, config.data_directory);
        assert_eq!(reloaded.max_object_size, MAX_OBJECT_SIZE);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("drive.toml");
        std::fs::write(
            &path,
            "data_directory = \"/var/lib/drive\"\n\n[store]\nbackend = \"memory\"\ndatabase_name = \"db\"\nstore_name = \"blobs\"\n",
        )
        .unwrap();

        let config = DriveConfig::load_or_create(path.to_str()).unwrap();
        assert_eq!(config.data_directory, PathBuf::from("/var/lib/drive"));
        assert_eq!(config.store.backend, Backend::Memory);
        assert_eq!(config.store.store_name, "blobs");
        assert_eq!(config.auth, AuthConfig::default());
        assert_eq!(config.log_filter, "filedrive=info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("drive.toml");
        std::fs::write(&path, "max_object_size = \"lots\"").unwrap();

        assert!(DriveConfig::load_or_create(path.to_str()).is_err());
    }
}
