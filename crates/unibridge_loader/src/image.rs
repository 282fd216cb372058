use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{info, warn};

use crate::config::LoaderConfig;
use crate::error::{LoaderError, LoaderResult};
use crate::platform::{DirectStaging, ImageStaging, NativeStaging, StagedImage};

/// A loaded module image.
///
/// Every address obtained through [`ModuleImage::find_symbol`] is only valid
/// while the image is loaded. Run the module's own drop entry point before
/// [`ModuleImage::unload`]; unloading first would leave the host calling into
/// unmapped memory.
pub struct ModuleImage {
    source: PathBuf,
    library: Option<Library>,
    staged: Option<StagedImage>,
}

impl ModuleImage {
    /// Loads `path` using the platform staging selected at build time, or
    /// opens it in place when `copy_on_load` is off.
    pub fn load(path: impl AsRef<Path>, config: &LoaderConfig) -> LoaderResult<Self> {
        if config.copy_on_load {
            Self::load_with(path, config, &NativeStaging)
        } else {
            Self::load_with(path, config, &DirectStaging)
        }
    }

    pub fn load_with(
        path: impl AsRef<Path>,
        config: &LoaderConfig,
        staging: &dyn ImageStaging,
    ) -> LoaderResult<Self> {
        let source = path.as_ref().to_path_buf();
        if !source.is_file() {
            return Err(LoaderError::Missing { path: source });
        }

        // dropping `staged` on the error path deletes the scratch copy
        let staged = staging.stage(&source, config)?;
        let library = open_library(staged.path()).map_err(|err| LoaderError::Open {
            path: staged.path().to_path_buf(),
            source: err,
        })?;

        info!(
            module = %source.display(),
            image = %staged.path().display(),
            staging = staging.name(),
            "module image loaded"
        );

        Ok(Self {
            source,
            library: Some(library),
            staged: Some(staged),
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.library.is_some()
    }

    /// The path the image was loaded from.
    pub fn source_path(&self) -> &Path {
        &self.source
    }

    /// The file actually mapped by the dynamic linker.
    pub fn image_path(&self) -> Option<&Path> {
        self.staged.as_ref().map(StagedImage::path)
    }

    /// Resolves an exported symbol.
    ///
    /// # Safety
    /// `T` must match the type of the exported item. The returned value must
    /// not be used after the image is unloaded.
    pub unsafe fn find_symbol<T: Copy>(&self, name: &str) -> LoaderResult<T> {
        let library = self.library.as_ref().ok_or(LoaderError::NotLoaded)?;
        let symbol = unsafe { library.get::<T>(name.as_bytes()) }.map_err(|err| {
            LoaderError::Symbol {
                symbol: name.to_owned(),
                path: self.source.clone(),
                source: err,
            }
        })?;
        Ok(*symbol)
    }

    /// Closes the image and deletes its scratch copy. Unloading an image that
    /// is not loaded is a no-op.
    pub fn unload(&mut self) -> LoaderResult<()> {
        let Some(library) = self.library.take() else {
            return Ok(());
        };

        let closed = library.close().map_err(|err| LoaderError::Close {
            path: self.source.clone(),
            source: err,
        });

        if let Some(staged) = self.staged.take() {
            let copy = staged.path().to_path_buf();
            if let Err(err) = staged.discard() {
                warn!(copy = %copy.display(), error = %err, "failed to delete staged module copy");
            }
        }

        closed?;
        info!(module = %self.source.display(), "module image unloaded");
        Ok(())
    }
}

impl Drop for ModuleImage {
    fn drop(&mut self) {
        if let Err(err) = self.unload() {
            warn!(error = %err, "module image unload failed");
        }
    }
}

impl std::fmt::Debug for ModuleImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleImage")
            .field("source", &self.source)
            .field("image", &self.image_path())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

    // resolve everything up front so a broken image fails here, not mid-call
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Library::from)
}

#[cfg(not(unix))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_image_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModuleImage::load(dir.path().join("libnothing.so"), &LoaderConfig::default())
            .unwrap_err();
        assert!(matches!(err, LoaderError::Missing { .. }));
    }

    #[test]
    fn test_garbage_image_fails_to_open_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("libgarbage.so");
        std::fs::write(&image, b"definitely not a shared object").unwrap();

        let config = LoaderConfig {
            install_name_tool: PathBuf::from("/usr/bin/true"),
            ..LoaderConfig::default()
        };
        let result = ModuleImage::load(&image, &config);
        assert!(matches!(
            result,
            Err(LoaderError::Open { .. } | LoaderError::RewriteId { .. })
        ));

        // only the original is left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("libgarbage.so")]);
    }
}
