use std::path::Path;

use tracing::debug;

use super::{ImageStaging, StagedImage, copy_to_scratch};
use crate::config::LoaderConfig;
use crate::error::LoaderResult;

/// Linux and Windows: a fresh file name is enough to get a fresh image.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyStaging;

impl ImageStaging for CopyStaging {
    fn stage(&self, image: &Path, config: &LoaderConfig) -> LoaderResult<StagedImage> {
        let temp = copy_to_scratch(image, config)?;
        debug!(image = %image.display(), copy = %temp.display(), "staged module image");
        Ok(StagedImage::scratch(temp))
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}
