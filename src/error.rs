use thiserror::Error;

/// Unified error type for all filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("record decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("invalid path")]
    InvalidPath,

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("{0} is not a directory")]
    NotDirectory(String),

    #[error("not a regular file: {0}")]
    NotFile(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("directory has no free entry blocks left")]
    DirectoryFull,

    #[error("file exceeds the addressing limit of the block map")]
    FileTooLarge,
}

/// Result alias using `FsError`.
pub type Result<T> = std::result::Result<T, FsError>;
