//! Bridge configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use unibridge_loader::LoaderConfig;

/// Complete bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Native module image to load
    pub module_path: Option<PathBuf>,

    /// How the image is staged before it is opened
    pub loader: LoaderConfig,

    /// `tracing` filter directive used when no env override is present
    pub log_filter: Option<String>,
}

impl BridgeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            module_path: std::env::var_os("UNIBRIDGE_MODULE")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            loader: LoaderConfig::from_env(),
            log_filter: std::env::var("UNIBRIDGE_LOG")
                .ok()
                .filter(|filter| !filter.is_empty()),
        }
    }

    /// Load configuration from TOML file
    #[cfg(feature = "toml-config")]
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from TOML file (stub when toml feature is disabled)
    #[cfg(not(feature = "toml-config"))]
    pub fn from_file(_path: &Path) -> anyhow::Result<Self> {
        anyhow::bail!("TOML support not enabled. Enable the 'toml-config' feature.")
    }

    /// Merge with environment variables (env vars take precedence)
    pub fn merge_with_env(mut self) -> Self {
        let env_config = Self::from_env();

        if env_config.module_path.is_some() {
            self.module_path = env_config.module_path;
        }

        if std::env::var("UNIBRIDGE_COPY_ON_LOAD").is_ok() {
            self.loader.copy_on_load = env_config.loader.copy_on_load;
        }

        if env_config.loader.scratch_dir.is_some() {
            self.loader.scratch_dir = env_config.loader.scratch_dir;
        }

        if std::env::var("UNIBRIDGE_INSTALL_NAME_TOOL").is_ok() {
            self.loader.install_name_tool = env_config.loader.install_name_tool;
        }

        if env_config.log_filter.is_some() {
            self.log_filter = env_config.log_filter;
        }

        self
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert!(config.module_path.is_none());
        assert!(config.loader.copy_on_load);
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_with_module() {
        let config = BridgeConfig::default().with_module("target/debug/libdemo.so");
        assert_eq!(
            config.module_path.as_deref(),
            Some(Path::new("target/debug/libdemo.so"))
        );
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        std::fs::write(
            &path,
            concat!(
                "module_path = \"mods/libspin.so\"\n",
                "log_filter = \"unibridge=debug\"\n",
                "\n",
                "[loader]\n",
                "copy_on_load = false\n",
            ),
        )
        .unwrap();

        let config = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(config.module_path.as_deref(), Some(Path::new("mods/libspin.so")));
        assert_eq!(config.log_filter.as_deref(), Some("unibridge=debug"));
        assert!(!config.loader.copy_on_load);
        assert!(config.loader.scratch_dir.is_none());
    }

    #[cfg(not(feature = "toml-config"))]
    #[test]
    fn test_from_file_needs_feature() {
        assert!(BridgeConfig::from_file(Path::new("bridge.toml")).is_err());
    }
}
