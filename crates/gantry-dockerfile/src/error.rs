use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockerfileError {
    #[error("Dockerfile not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read Dockerfile {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Dockerfile line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("required arg {name} was not set by --build-arg (line {line})")]
    MissingBuildArg { name: String, line: usize },

    #[error("Dockerfile line {line}: path {operand} is not inside the build context")]
    ContextEscape { line: usize, operand: String },

    #[error("Dockerfile line {line}: invalid glob pattern {pattern}: {source}")]
    InvalidGlob {
        line: usize,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DockerfileError>;
