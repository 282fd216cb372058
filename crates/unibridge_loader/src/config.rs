//! Loader configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How module images are prepared before they are opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Load a uniquely named copy instead of the image itself, so the
    /// dynamic linker cannot hand back a cached image on reload
    pub copy_on_load: bool,

    /// Where staged copies go (defaults to the directory of the image)
    pub scratch_dir: Option<PathBuf>,

    /// Tool used to rewrite the embedded install id on macOS
    pub install_name_tool: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            copy_on_load: true,
            scratch_dir: None,
            install_name_tool: PathBuf::from("/usr/bin/install_name_tool"),
        }
    }
}

impl LoaderConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("UNIBRIDGE_COPY_ON_LOAD") {
            config.copy_on_load = val.parse().unwrap_or(true);
        }

        if let Ok(dir) = std::env::var("UNIBRIDGE_SCRATCH_DIR")
            && !dir.is_empty()
        {
            config.scratch_dir = Some(PathBuf::from(dir));
        }

        if let Ok(tool) = std::env::var("UNIBRIDGE_INSTALL_NAME_TOOL")
            && !tool.is_empty()
        {
            config.install_name_tool = PathBuf::from(tool);
        }

        config
    }
}
