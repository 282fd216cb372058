use std::path::PathBuf;

use thiserror::Error;
use unibridge_loader::LoaderError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("no module image configured (set UNIBRIDGE_MODULE or module_path)")]
    NoModule,

    #[error("module {path} speaks glue ABI v{found}, host expects v{expected}")]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("another bridge is already active on this thread")]
    AlreadyActive,

    #[error("bridge is not initialized")]
    NotInitialized,

    #[error("native module panicked; bridge halted")]
    Halted,

    #[error("no behaviour with id {0}")]
    UnknownBehaviour(u32),

    #[error("module refused to create a behaviour")]
    AttachRejected,
}

pub type BridgeResult<T> = Result<T, BridgeError>;
