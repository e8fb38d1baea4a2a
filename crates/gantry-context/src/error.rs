use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid ignore pattern {pattern}: {source}")]
    InvalidIgnorePattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to read ignore file {path}: {source}")]
    IgnoreFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path is outside the build context: {0}")]
    OutsideContext(PathBuf),

    #[error("source path vanished during packaging: {0}")]
    Vanished(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContextError>;
