//! Per-platform image staging.
//!
//! Every platform copies the image to a uniquely named scratch file before
//! opening it. macOS additionally rewrites the install id embedded in the
//! copy, otherwise dyld resolves the copy to the image it already mapped.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::config::LoaderConfig;
use crate::error::{LoaderError, LoaderResult};

#[cfg(target_os = "macos")]
mod darwin;
#[cfg(not(target_os = "macos"))]
mod generic;

#[cfg(target_os = "macos")]
pub use darwin::DarwinStaging as NativeStaging;
#[cfg(not(target_os = "macos"))]
pub use generic::CopyStaging as NativeStaging;

/// Prepares the file that actually gets opened for a module image.
pub trait ImageStaging {
    fn stage(&self, image: &Path, config: &LoaderConfig) -> LoaderResult<StagedImage>;

    fn name(&self) -> &'static str;
}

/// The file handed to the dynamic linker, plus the scratch copy backing it
/// if there is one.
#[derive(Debug)]
pub struct StagedImage {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl StagedImage {
    pub fn direct(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            temp: None,
        }
    }

    pub fn scratch(temp: TempPath) -> Self {
        Self {
            path: temp.to_path_buf(),
            temp: Some(temp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_copy(&self) -> bool {
        self.temp.is_some()
    }

    /// Deletes the scratch copy, if any.
    pub fn discard(self) -> std::io::Result<()> {
        match self.temp {
            Some(temp) => temp.close(),
            None => Ok(()),
        }
    }
}

/// Opens the image where it is. Reloading the same path may return the
/// image that is already mapped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectStaging;

impl ImageStaging for DirectStaging {
    fn stage(&self, image: &Path, _config: &LoaderConfig) -> LoaderResult<StagedImage> {
        Ok(StagedImage::direct(image))
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Copies `image` to `<stem>.tmp.<random>.<ext>` in the scratch directory.
pub(crate) fn copy_to_scratch(image: &Path, config: &LoaderConfig) -> LoaderResult<TempPath> {
    let stage_err = |source| LoaderError::Stage {
        path: image.to_path_buf(),
        source,
    };

    let dir = match &config.scratch_dir {
        Some(dir) => dir.clone(),
        None => match image.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    };
    let stem = image
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("module");
    let suffix = image
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix(&format!("{stem}.tmp."))
        .suffix(&suffix)
        .rand_bytes(6)
        .tempfile_in(&dir)
        .map_err(stage_err)?
        .into_temp_path();

    fs::copy(image, &temp).map_err(stage_err)?;
    Ok(temp)
}
