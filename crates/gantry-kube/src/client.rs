use crate::error::Result;

/// Create a cluster client from the ambient environment.
///
/// Resolves the kubeconfig the same way kubectl does (KUBECONFIG,
/// `~/.kube/config`) and falls back to in-cluster service-account
/// credentials when running inside a pod.
pub async fn client() -> Result<kube::Client> {
    let client = kube::Client::try_default().await?;
    Ok(client)
}
