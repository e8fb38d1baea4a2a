use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to resolve build dependencies: {0}")]
    Resolution(#[from] gantry_dockerfile::DockerfileError),

    #[error("failed to package build context: {0}")]
    Packaging(#[from] gantry_context::ContextError),

    #[error("cluster operation failed: {0}")]
    Kube(#[from] gantry_kube::KubeError),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("failed to load registry credentials: {0}")]
    Credentials(String),

    #[error("context delivery failed: {0}")]
    Delivery(String),

    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BuildError>;
