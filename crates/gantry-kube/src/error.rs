use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("exec in container failed: {0}")]
    ExecFailed(String),

    #[error("archive must be a .tar.gz: {0}")]
    InvalidArchive(PathBuf),

    #[error("timed out waiting for pod {0} to initialize")]
    InitTimeout(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KubeError>;
