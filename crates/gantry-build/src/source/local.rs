//! initコンテナ経由のローカル受け渡し
//!
//! Podに待機専用のinitコンテナと空ボリュームを足し、exec経由で
//! アーカイブを流し込む。完了マーカーを置くまで本体コンテナは
//! 起動しないため、書き込み途中のコンテキストを読まれることはない。

use crate::error::Result;
use crate::pod::{CONTEXT_MOUNT_PATH, CONTEXT_VOLUME_NAME, INIT_CONTAINER_NAME};
use crate::source::ContextSource;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Pod, Volume, VolumeMount};
use kube::api::Api;
use std::path::Path;
use tokio_util::sync::CancellationToken;

const INIT_IMAGE: &str = "alpine";
const COMPLETE_MARKER: &str = "/tmp/complete";

/// ローカルのアーカイブをinitコンテナへ直接アップロードする戦略
pub struct LocalSource;

#[async_trait]
impl ContextSource for LocalSource {
    fn name(&self) -> &'static str {
        "local"
    }

    fn modify_pod(&self, pod: &mut Pod) {
        let Some(spec) = pod.spec.as_mut() else {
            return;
        };

        // 完了マーカーが置かれるまで待ち続けるinitコンテナ
        spec.init_containers = Some(vec![Container {
            name: INIT_CONTAINER_NAME.to_string(),
            image: Some(INIT_IMAGE.to_string()),
            args: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                format!(
                    "while true; do sleep 1; if [ -f {} ]; then break; fi; done",
                    COMPLETE_MARKER
                ),
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: CONTEXT_VOLUME_NAME.to_string(),
                mount_path: CONTEXT_MOUNT_PATH.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }]);

        if let Some(container) = spec.containers.first_mut() {
            container
                .args
                .get_or_insert_with(Vec::new)
                .push(format!("--context=dir://{}", CONTEXT_MOUNT_PATH));
            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .push(VolumeMount {
                    name: CONTEXT_VOLUME_NAME.to_string(),
                    mount_path: CONTEXT_MOUNT_PATH.to_string(),
                    ..Default::default()
                });
        }

        spec.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: CONTEXT_VOLUME_NAME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    async fn prepare_credentials(&self, _client: &kube::Client, _namespace: &str) -> Result<()> {
        Ok(())
    }

    fn requires_pod(&self) -> bool {
        true
    }

    async fn upload_context(
        &self,
        client: &kube::Client,
        namespace: &str,
        pod_name: &str,
        tar_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);

        gantry_kube::wait_for_pod_initialized(&pods, pod_name, cancel).await?;

        tracing::info!("Copying build context into container...");
        gantry_kube::copy_tar_into_container(
            &pods,
            pod_name,
            INIT_CONTAINER_NAME,
            tar_path,
            CONTEXT_MOUNT_PATH,
        )
        .await?;

        // 完了マーカーでinitコンテナの待機ループを抜けさせる
        gantry_kube::exec(
            &pods,
            pod_name,
            INIT_CONTAINER_NAME,
            vec!["touch".to_string(), COMPLETE_MARKER.to_string()],
        )
        .await?;

        tracing::info!("Finished copying build context.");
        Ok(())
    }

    async fn cleanup(&self, _client: &kube::Client, _namespace: &str) {
        // アップロード先はPodと共に消えるため個別の掃除は不要
    }
}
