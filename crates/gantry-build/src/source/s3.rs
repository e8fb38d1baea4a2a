//! S3バケット経由の受け渡し
//!
//! Pod作成前にアーカイブをバケットへ上げ、kanikoには
//! `--context=s3://<bucket>/<key>` を渡す。バケットの読み出しに使う
//! AWS資格情報はSecretとしてマウントし、環境変数でパスを知らせる。
//! initコンテナの起動を待つ必要がないため、アップロードは
//! スケジューリングより先に完了する。

use crate::auth;
use crate::error::{BuildError, Result};
use crate::source::ContextSource;
use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{EnvVar, Pod, Secret, SecretVolumeSource, Volume, VolumeMount};
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// 配送用AWS資格情報を保持するSecretの名前
pub const S3_SECRET_NAME: &str = "gantry-s3-credentials";

const SECRET_VOLUME_NAME: &str = "aws-credentials";
const SECRET_MOUNT_PATH: &str = "/secret";
const SECRET_CREDENTIALS_KEY: &str = "credentials";

/// コンテキストをS3バケット経由で受け渡す戦略
pub struct S3Source {
    bucket: String,
    region: Option<String>,
    key: String,
}

impl S3Source {
    pub fn new(bucket: impl Into<String>, region: Option<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region,
            key: format!("context-{}.tar.gz", uuid::Uuid::new_v4().simple()),
        }
    }

    /// アップロード先のオブジェクトキー
    pub fn object_key(&self) -> &str {
        &self.key
    }

    /// AWS共有資格情報ファイルの場所
    fn credentials_path() -> PathBuf {
        std::env::var("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".aws").join("credentials"))
                    .unwrap_or_else(|| PathBuf::from(".aws/credentials"))
            })
    }

    async fn s3_client(&self) -> aws_sdk_s3::Client {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        aws_sdk_s3::Client::new(&loader.load().await)
    }
}

#[async_trait]
impl ContextSource for S3Source {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn modify_pod(&self, pod: &mut Pod) {
        let Some(spec) = pod.spec.as_mut() else {
            return;
        };

        if let Some(container) = spec.containers.first_mut() {
            container
                .args
                .get_or_insert_with(Vec::new)
                .push(format!("--context=s3://{}/{}", self.bucket, self.key));

            let env = container.env.get_or_insert_with(Vec::new);
            env.push(EnvVar {
                name: "AWS_SHARED_CREDENTIALS_FILE".to_string(),
                value: Some(format!("{}/{}", SECRET_MOUNT_PATH, SECRET_CREDENTIALS_KEY)),
                ..Default::default()
            });
            if let Some(region) = &self.region {
                env.push(EnvVar {
                    name: "AWS_REGION".to_string(),
                    value: Some(region.clone()),
                    ..Default::default()
                });
            }

            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .push(VolumeMount {
                    name: SECRET_VOLUME_NAME.to_string(),
                    mount_path: SECRET_MOUNT_PATH.to_string(),
                    ..Default::default()
                });
        }

        spec.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: SECRET_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(S3_SECRET_NAME.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    async fn prepare_credentials(&self, client: &kube::Client, namespace: &str) -> Result<()> {
        let path = Self::credentials_path();
        let credentials = tokio::fs::read(&path).await.map_err(|e| {
            BuildError::Credentials(format!(
                "failed to read AWS credentials at {}: {}",
                path.display(),
                e
            ))
        })?;

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(S3_SECRET_NAME.to_string()),
                labels: Some(auth::builder_labels()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                SECRET_CREDENTIALS_KEY.to_string(),
                ByteString(credentials),
            )])),
            ..Default::default()
        };

        // 連続実行を許容するため、既存のSecretは置き換える
        let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
        match secrets.get_opt(S3_SECRET_NAME).await? {
            Some(existing) => {
                let mut replacement = secret;
                replacement.metadata.resource_version = existing.metadata.resource_version;
                secrets
                    .replace(S3_SECRET_NAME, &PostParams::default(), &replacement)
                    .await?;
            }
            None => {
                secrets.create(&PostParams::default(), &secret).await?;
            }
        }

        Ok(())
    }

    fn requires_pod(&self) -> bool {
        false
    }

    async fn upload_context(
        &self,
        _client: &kube::Client,
        _namespace: &str,
        _pod_name: &str,
        tar_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BuildError::Kube(gantry_kube::KubeError::Cancelled));
        }

        tracing::info!("Uploading build context to s3://{}/{}", self.bucket, self.key);

        let s3 = self.s3_client().await;
        let body = aws_sdk_s3::primitives::ByteStream::from_path(tar_path)
            .await
            .map_err(|e| BuildError::Delivery(format!("failed to open archive: {}", e)))?;

        tokio::select! {
            _ = cancel.cancelled() => Err(BuildError::Kube(gantry_kube::KubeError::Cancelled)),
            result = s3
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .body(body)
                .send() =>
            {
                result.map_err(|e| {
                    BuildError::Delivery(format!(
                        "failed to upload context to bucket {}: {}",
                        self.bucket, e
                    ))
                })?;
                tracing::info!("Finished uploading build context.");
                Ok(())
            }
        }
    }

    async fn cleanup(&self, client: &kube::Client, namespace: &str) {
        let s3 = self.s3_client().await;
        if let Err(e) = s3
            .delete_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
        {
            tracing::error!("failed to delete context from bucket {}: {}", self.bucket, e);
        }

        let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
        if let Err(e) = secrets.delete(S3_SECRET_NAME, &DeleteParams::default()).await {
            tracing::error!("failed to delete S3 credentials secret: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Build;
    use crate::pod::kaniko_pod;
    use std::path::PathBuf;

    fn base_pod() -> Pod {
        let build = Build {
            image_tags: vec!["ghcr.io/org/app:v1".to_string()],
            work_dir: PathBuf::from("."),
            dockerfile_path: PathBuf::from("Dockerfile"),
            cache: false,
            cache_repo: None,
            namespace: "default".to_string(),
            build_args: Vec::new(),
            credentials: Vec::new(),
        };
        kaniko_pod(&build, "gantry-test")
    }

    #[test]
    fn test_object_key_is_unique_archive_name() {
        let a = S3Source::new("bucket", None);
        let b = S3Source::new("bucket", None);

        assert!(a.object_key().starts_with("context-"));
        assert!(a.object_key().ends_with(".tar.gz"));
        assert_ne!(a.object_key(), b.object_key());
    }

    #[test]
    fn test_modify_pod_adds_bucket_context_arg() {
        let source = S3Source::new("builds", None);
        let mut pod = base_pod();
        source.modify_pod(&mut pod);

        let args = pod.spec.as_ref().unwrap().containers[0]
            .args
            .as_ref()
            .unwrap()
            .clone();
        assert!(args.contains(&format!("--context=s3://builds/{}", source.object_key())));
    }

    #[test]
    fn test_modify_pod_mounts_credentials_secret() {
        let source = S3Source::new("builds", Some("ap-northeast-1".to_string()));
        let mut pod = base_pod();
        source.modify_pod(&mut pod);

        let spec = pod.spec.as_ref().unwrap();

        let env = spec.containers[0].env.as_ref().unwrap();
        assert!(env.iter().any(|e| {
            e.name == "AWS_SHARED_CREDENTIALS_FILE"
                && e.value.as_deref() == Some("/secret/credentials")
        }));
        assert!(env
            .iter()
            .any(|e| e.name == "AWS_REGION" && e.value.as_deref() == Some("ap-northeast-1")));

        let volumes = spec.volumes.as_ref().unwrap();
        assert!(volumes.iter().any(|v| {
            v.secret
                .as_ref()
                .and_then(|s| s.secret_name.as_deref())
                == Some(S3_SECRET_NAME)
        }));

        // initコンテナは増えない（Pod作成前にアップロード済みのため）
        assert!(spec.init_containers.is_none());
    }

    #[test]
    fn test_requires_pod() {
        assert!(!S3Source::new("bucket", None).requires_pod());
    }
}
