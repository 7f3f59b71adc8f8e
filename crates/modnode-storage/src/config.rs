use modnode_core::constants::{CREDENTIALS_FILE_NAME, REGISTRY_FILE_NAME};
use std::path::{Path, PathBuf};

/// Location of the node's persisted documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Directory holding every document
    pub state_dir: PathBuf,

    /// File name of the module registry document
    pub registry_file: String,

    /// File name of the network credentials document
    pub credentials_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
            registry_file: REGISTRY_FILE_NAME.to_string(),
            credentials_file: CREDENTIALS_FILE_NAME.to_string(),
        }
    }
}

impl StorageConfig {
    /// Create a configuration rooted at `state_dir`
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ..Default::default()
        }
    }

    /// Set the registry file name
    pub fn registry_file(mut self, name: impl Into<String>) -> Self {
        self.registry_file = name.into();
        self
    }

    /// Set the credentials file name
    pub fn credentials_file(mut self, name: impl Into<String>) -> Self {
        self.credentials_file = name.into();
        self
    }

    /// Full path of the registry document
    pub fn registry_path(&self) -> PathBuf {
        self.state_dir.join(&self.registry_file)
    }

    /// Full path of the credentials document
    pub fn credentials_path(&self) -> PathBuf {
        self.state_dir.join(&self.credentials_file)
    }

    /// Directory holding every document
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = StorageConfig::default();
        assert_eq!(config.registry_path(), PathBuf::from("./modules.json"));
        assert_eq!(
            config.credentials_path(),
            PathBuf::from("./wifi_credentials.json")
        );
    }

    #[test]
    fn test_builder() {
        let config = StorageConfig::new("/var/lib/modnode")
            .registry_file("registry.json")
            .credentials_file("network.json");
        assert_eq!(
            config.registry_path(),
            PathBuf::from("/var/lib/modnode/registry.json")
        );
        assert_eq!(
            config.credentials_path(),
            PathBuf::from("/var/lib/modnode/network.json")
        );
    }
}
