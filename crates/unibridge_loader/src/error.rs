use std::path::PathBuf;

use thiserror::Error;

/// Loader failures. All of them are fatal for the bridge: it cannot start
/// without its module.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("module image {path} does not exist")]
    Missing { path: PathBuf },

    #[error("failed to stage a copy of {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rewrite the install id of {path}: {reason}")]
    RewriteId { path: PathBuf, reason: String },

    #[error("failed to load module image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("failed to load symbol \"{symbol}\" from {path}: {source}")]
    Symbol {
        symbol: String,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("module image is not loaded")]
    NotLoaded,

    #[error("failed to unload module image {path}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
}

pub type LoaderResult<T> = Result<T, LoaderError>;
