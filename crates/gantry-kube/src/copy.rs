use crate::error::{KubeError, Result};
use crate::exec::exec_with_stdin;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use std::path::Path;

/// Stream a local .tar.gz into a container and unpack it at `dest_dir`.
///
/// The archive is piped to `tar -zxf -` over the exec channel, so
/// nothing is staged on the node's filesystem.
pub async fn copy_tar_into_container(
    pods: &Api<Pod>,
    pod_name: &str,
    container: &str,
    tar_path: &Path,
    dest_dir: &str,
) -> Result<()> {
    if tar_path.extension().and_then(|e| e.to_str()) != Some("gz") {
        return Err(KubeError::InvalidArchive(tar_path.to_path_buf()));
    }

    let file = tokio::fs::File::open(tar_path).await?;
    let command = ["tar", "-zxf", "-", "-C", dest_dir]
        .into_iter()
        .map(String::from)
        .collect();

    exec_with_stdin(pods, pod_name, container, command, Some(file)).await
}
