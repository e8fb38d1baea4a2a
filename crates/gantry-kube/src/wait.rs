use crate::error::{KubeError, Result};
use k8s_openapi::api::core::v1::{ContainerStateTerminated, Pod};
use kube::api::Api;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const INIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Wait until one of the pod's init containers is running.
///
/// Bounded by a 10 minute timeout; a cancellation request aborts the
/// wait immediately.
pub async fn wait_for_pod_initialized(
    pods: &Api<Pod>,
    pod_name: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    tracing::info!("Waiting for pod {} to be initialized", pod_name);

    let deadline = tokio::time::Instant::now() + INIT_TIMEOUT;

    loop {
        if cancel.is_cancelled() {
            return Err(KubeError::Cancelled);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(KubeError::InitTimeout(pod_name.to_string()));
        }

        match pods.get(pod_name).await {
            Ok(pod) => {
                let initializing = pod
                    .status
                    .as_ref()
                    .and_then(|status| status.init_container_statuses.as_ref())
                    .is_some_and(|statuses| {
                        statuses.iter().any(|s| {
                            s.state
                                .as_ref()
                                .is_some_and(|state| state.running.is_some())
                        })
                    });
                if initializing {
                    return Ok(());
                }
            }
            // the pod may not be visible yet right after creation
            Err(e) => tracing::debug!("Getting pod {}: {}", pod_name, e),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(KubeError::Cancelled),
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

/// Wait until the named container reaches a terminated state.
///
/// Returns `Ok(None)` if cancelled before termination; polling is
/// otherwise unbounded.
pub async fn wait_for_container_terminated(
    pods: &Api<Pod>,
    pod_name: &str,
    container: &str,
    cancel: &CancellationToken,
) -> Result<Option<ContainerStateTerminated>> {
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        match pods.get(pod_name).await {
            Ok(pod) => {
                if let Some(terminated) = container_terminal_state(&pod, container) {
                    return Ok(Some(terminated));
                }
            }
            Err(e) => tracing::debug!("Getting pod {}: {}", pod_name, e),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

/// Extract the terminated state of a named container, if any.
pub fn container_terminal_state(pod: &Pod, container: &str) -> Option<ContainerStateTerminated> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .iter()
        .find(|s| s.name == container)?
        .state
        .as_ref()?
        .terminated
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerState, ContainerStatus, PodStatus};

    fn pod_with_status(container: &str, state: Option<ContainerState>) -> Pod {
        Pod {
            status: Some(PodStatus {
                container_statuses: Some(vec![ContainerStatus {
                    name: container.to_string(),
                    state,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_terminal_state_present() {
        let pod = pod_with_status(
            "build",
            Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    reason: Some("Error".to_string()),
                    exit_code: 1,
                    ..Default::default()
                }),
                ..Default::default()
            }),
        );

        let terminated = container_terminal_state(&pod, "build").unwrap();
        assert_eq!(terminated.reason.as_deref(), Some("Error"));
    }

    #[test]
    fn test_terminal_state_absent_while_running() {
        let pod = pod_with_status("build", Some(ContainerState::default()));
        assert!(container_terminal_state(&pod, "build").is_none());
    }

    #[test]
    fn test_terminal_state_other_container() {
        let pod = pod_with_status(
            "sidecar",
            Some(ContainerState {
                terminated: Some(ContainerStateTerminated::default()),
                ..Default::default()
            }),
        );
        assert!(container_terminal_state(&pod, "build").is_none());
    }

    #[test]
    fn test_terminal_state_no_status() {
        let pod = Pod::default();
        assert!(container_terminal_state(&pod, "build").is_none());
    }
}
