use crate::error::{KubeError, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Execute a command inside a container, optionally streaming stdin into it.
///
/// The command's exit status is taken from the apiserver's status frame;
/// a `Failure` status is surfaced as an error with the server's message.
pub async fn exec_with_stdin<R>(
    pods: &Api<Pod>,
    pod_name: &str,
    container: &str,
    command: Vec<String>,
    stdin: Option<R>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let params = AttachParams::default()
        .container(container)
        .stdin(stdin.is_some())
        .stdout(true)
        .stderr(true);

    let mut attached = pods.exec(pod_name, command, &params).await?;

    if let Some(mut reader) = stdin {
        let mut writer = attached
            .stdin()
            .ok_or_else(|| KubeError::ExecFailed("stdin stream unavailable".to_string()))?;
        tokio::io::copy(&mut reader, &mut writer).await?;
        // close the stream so the remote command sees EOF
        writer.shutdown().await?;
    }

    if let Some(status_future) = attached.take_status() {
        if let Some(status) = status_future.await {
            if status.status.as_deref() == Some("Failure") {
                let message = status
                    .message
                    .unwrap_or_else(|| "command failed".to_string());
                return Err(KubeError::ExecFailed(message));
            }
        }
    }

    attached
        .join()
        .await
        .map_err(|e| KubeError::ExecFailed(e.to_string()))?;

    Ok(())
}

/// Execute a command inside a container without stdin.
pub async fn exec(
    pods: &Api<Pod>,
    pod_name: &str,
    container: &str,
    command: Vec<String>,
) -> Result<()> {
    exec_with_stdin::<tokio::io::Empty>(pods, pod_name, container, command, None).await
}
