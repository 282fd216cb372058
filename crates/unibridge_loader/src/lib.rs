//! Hot-reload loader for native bridge modules.
//!
//! Loads a module's dynamic library (through a staged copy by default, so a
//! rebuilt image is really reloaded), resolves its exports and unloads it
//! again. The loader is only consulted at lifecycle boundaries: init,
//! teardown and reload.

pub mod config;
pub mod error;
pub mod image;
pub mod platform;
pub mod watch;

pub use config::LoaderConfig;
pub use error::{LoaderError, LoaderResult};
pub use image::ModuleImage;
pub use platform::{DirectStaging, ImageStaging, NativeStaging, StagedImage};
pub use watch::{ImageWatcher, fingerprint};
