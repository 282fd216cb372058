use std::ffi::OsStr;
use std::path::Path;

use tracing::debug;

use super::{ImageStaging, StagedImage, copy_to_scratch};
use crate::config::LoaderConfig;
use crate::error::{LoaderError, LoaderResult};

/// macOS: copy, then give the copy its own install id.
#[derive(Debug, Default, Clone, Copy)]
pub struct DarwinStaging;

impl ImageStaging for DarwinStaging {
    fn stage(&self, image: &Path, config: &LoaderConfig) -> LoaderResult<StagedImage> {
        let temp = copy_to_scratch(image, config)?;
        let unique = temp
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("module.dylib");
        let install_id = format!("/tmp/unibridge.{unique}");

        let output = duct::cmd!(&config.install_name_tool, "-id", &install_id, &*temp)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|err| LoaderError::RewriteId {
                path: temp.to_path_buf(),
                reason: err.to_string(),
            })?;

        if !output.status.success() {
            return Err(LoaderError::RewriteId {
                path: temp.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        debug!(
            image = %image.display(),
            copy = %temp.display(),
            %install_id,
            "staged module image"
        );
        Ok(StagedImage::scratch(temp))
    }

    fn name(&self) -> &'static str {
        "darwin"
    }
}
