//! Error types for blocktree-core

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Index corruption: {0}")]
    Corruption(String),

    #[error("Unsupported {codec} version {version} (expected {min}..={max})")]
    VersionMismatch {
        codec: String,
        version: u32,
        min: u32,
        max: u32,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("FST error: {0}")]
    Fst(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error::Fst(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
