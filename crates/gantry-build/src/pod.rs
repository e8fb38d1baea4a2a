//! kaniko Podスペックの構築
//!
//! ここで組み立てるのは受け渡し方式に依存しない共通部分のみ。
//! コンテキストの受け取り方（init経由・オブジェクトストア経由）は
//! ContextSourceがスケジューリング前にスペックを書き換えて決める。

use crate::auth;
use crate::builder::Build;
use crate::reference;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, Pod, PodSpec, Volume, VolumeMount,
};
use kube::api::ObjectMeta;

/// ビルド本体のコンテナ名
pub const BUILD_CONTAINER_NAME: &str = "gantry-build";
/// ローカル受け渡しで使うinitコンテナ名
pub const INIT_CONTAINER_NAME: &str = "gantry-init";
/// コンテキスト共有ボリューム名
pub const CONTEXT_VOLUME_NAME: &str = "build-context";
/// コンテキストのマウント先
pub const CONTEXT_MOUNT_PATH: &str = "/kaniko/build-context";

const DOCKER_CONFIG_VOLUME_NAME: &str = "docker-config";
const DOCKER_CONFIG_MOUNT_PATH: &str = "/kaniko/.docker";
const KANIKO_IMAGE: &str = "gcr.io/kaniko-project/executor:latest";

/// ビルド要求からkaniko Podスペックを組み立てる
pub fn kaniko_pod(build: &Build, pod_name: &str) -> Pod {
    let mut args = vec![format!(
        "--dockerfile={}",
        build.dockerfile_path.display()
    )];
    for tag in &build.image_tags {
        args.push(format!("--destination={}", tag));
    }
    for (key, value) in &build.build_args {
        args.push(format!("--build-arg={}={}", key, value));
    }

    // キャッシュは --cache 指定時のみ有効化する
    if build.cache {
        let cache_repo = build
            .cache_repo
            .clone()
            .unwrap_or_else(|| reference::default_cache_repo(&build.image_tags[0]));
        args.push("--cache=true".to_string());
        args.push(format!("--cache-repo={}", cache_repo));
    }

    Pod {
        metadata: ObjectMeta {
            name: Some(pod_name.to_string()),
            namespace: Some(build.namespace.clone()),
            labels: Some(auth::builder_labels()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            containers: vec![Container {
                name: BUILD_CONTAINER_NAME.to_string(),
                image: Some(KANIKO_IMAGE.to_string()),
                args: Some(args),
                volume_mounts: Some(vec![VolumeMount {
                    name: DOCKER_CONFIG_VOLUME_NAME.to_string(),
                    mount_path: DOCKER_CONFIG_MOUNT_PATH.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: DOCKER_CONFIG_VOLUME_NAME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: Some(auth::CREDENTIALS_MAP_NAME.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
