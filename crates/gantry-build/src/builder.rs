//! kanikoビルドのオーケストレーション
//!
//! 資格情報の発行 → コンテキスト生成 → Podスケジューリング →
//! コンテキスト受け渡し → ログ追跡と完了監視 → 後始末、という
//! ライフサイクルを順に駆動する。後始末は結果にかかわらず必ず走り、
//! 後始末の失敗が本来の結果を上書きすることはない。

use crate::auth;
use crate::error::{BuildError, Result};
use crate::logs;
use crate::pod;
use crate::source::ContextSource;
use gantry_kube::KubeError;
use k8s_openapi::api::core::v1::{ConfigMap, ContainerStateTerminated, Pod};
use kube::api::{Api, DeleteParams, PostParams};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// コンテキストサイズの警告しきい値
const MAX_CONTEXT_SIZE: u64 = 500 * 1024 * 1024; // 500MB

/// ビルドの最終結果
///
/// 成否はビルドコンテナの終了理由からのみ導出し、ログの内容からは
/// 推測しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    /// kanikoコンテナがエラー終了した（インフラ障害ではない）
    Failed { reason: String },
    Cancelled,
}

/// 1回分のビルド要求
///
/// ビルド開始後は変更されない。グローバルな設定からではなく、
/// 呼び出し側がこの値を組み立ててオーケストレータに渡す。
#[derive(Debug, Clone)]
pub struct Build {
    /// 完成イメージのdestinationタグ（1つ以上）
    pub image_tags: Vec<String>,
    /// ビルドコンテキストの作業ディレクトリ
    pub work_dir: PathBuf,
    /// 作業ディレクトリ内のDockerfile相対パス
    pub dockerfile_path: PathBuf,
    /// RUNステップのキャッシュを有効化するか
    pub cache: bool,
    /// キャッシュイメージのリポジトリ（省略時はdestinationから導出）
    pub cache_repo: Option<String>,
    /// ビルドを実行するNamespace
    pub namespace: String,
    /// ビルド引数（記述順を保持）
    pub build_args: Vec<(String, String)>,
    /// docker config 形式のレジストリ資格情報
    pub credentials: Vec<u8>,
}

/// 後始末の対象を記録するスクラッチ領域
#[derive(Default)]
struct Scratch {
    tar_path: Option<PathBuf>,
    pod_name: Option<String>,
    delivery_prepared: bool,
}

impl Build {
    /// ビルドを実行して結果を返す
    ///
    /// 失敗・キャンセルを問わず、作成済みのリモートリソース
    /// （Pod・資格情報ConfigMap・配送用リソース）は返る前に削除される。
    pub async fn start_build(
        &self,
        client: &kube::Client,
        source: &dyn ContextSource,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome> {
        let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &self.namespace);
        let pods: Api<Pod> = Api::namespaced(client.clone(), &self.namespace);

        self.ensure_credentials_map(&config_maps).await?;

        let mut scratch = Scratch::default();
        let result = self
            .run(client, &pods, source, cancel, &mut scratch)
            .await;

        // ここから先は必ず実行される後始末。失敗はログに残すだけで
        // 本来の結果を上書きしない。
        self.cleanup(client, &pods, &config_maps, source, &scratch)
            .await;

        result
    }

    async fn run(
        &self,
        client: &kube::Client,
        pods: &Api<Pod>,
        source: &dyn ContextSource,
        cancel: &CancellationToken,
        scratch: &mut Scratch,
    ) -> Result<BuildOutcome> {
        // コンテキスト生成はリモートリソースを増やす前に済ませる
        let progress = crate::progress::BuildProgress::new("ビルドコンテキストを作成中...");
        let context_result = self.generate_context();
        progress.finish_and_clear();
        let tar_path = context_result?;
        scratch.tar_path = Some(tar_path.clone());

        let pod_name = format!(
            "gantry-{}",
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let mut kaniko_pod = pod::kaniko_pod(self, &pod_name);
        source.modify_pod(&mut kaniko_pod);

        source.prepare_credentials(client, &self.namespace).await?;
        scratch.delivery_prepared = true;

        // オブジェクトストア経由はPod作成前にアップロードを終える
        if !source.requires_pod() {
            match source
                .upload_context(client, &self.namespace, &pod_name, &tar_path, cancel)
                .await
            {
                Ok(()) => {}
                Err(BuildError::Kube(KubeError::Cancelled)) => {
                    return Ok(BuildOutcome::Cancelled);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("Scheduling build pod {}", pod_name);
        pods.create(&PostParams::default(), &kaniko_pod).await?;
        scratch.pod_name = Some(pod_name.clone());

        // ローカル経由はinit段階のコンテナへアップロードする
        if source.requires_pod() {
            match source
                .upload_context(client, &self.namespace, &pod_name, &tar_path, cancel)
                .await
            {
                Ok(()) => {}
                Err(BuildError::Kube(KubeError::Cancelled)) => {
                    return Ok(BuildOutcome::Cancelled);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("Starting build...");

        // ログ追跡は完了時にもこちらから畳めるよう子トークンで止める
        let log_cancel = cancel.child_token();
        let log_task = tokio::spawn(logs::stream_build_logs(
            pods.clone(),
            pod_name.clone(),
            pod::BUILD_CONTAINER_NAME.to_string(),
            log_cancel.clone(),
        ));

        let terminated = gantry_kube::wait_for_container_terminated(
            pods,
            &pod_name,
            pod::BUILD_CONTAINER_NAME,
            cancel,
        )
        .await;

        log_cancel.cancel();
        if let Err(e) = log_task.await {
            tracing::debug!("log task aborted: {}", e);
        }

        let outcome = match terminated? {
            None => {
                tracing::info!("Build was cancelled");
                BuildOutcome::Cancelled
            }
            Some(state) => {
                let outcome = outcome_from_terminal_state(&state);
                if outcome == BuildOutcome::Succeeded {
                    tracing::info!("Build succeeded.");
                }
                outcome
            }
        };

        Ok(outcome)
    }

    /// 依存解決とパッケージングを行い、一時アーカイブのパスを返す
    fn generate_context(&self) -> Result<PathBuf> {
        let resolver = gantry_dockerfile::Resolver::new(&self.work_dir);
        let paths = resolver.resolve(&self.dockerfile_path, &self.build_args)?;

        let ignore = gantry_context::IgnoreRuleSet::load(&self.work_dir)?;
        let packager = gantry_context::Packager::new(&self.work_dir, ignore);

        let tar_path = std::env::temp_dir().join(format!(
            "context-{}.tar.gz",
            uuid::Uuid::new_v4().simple()
        ));
        let file = std::fs::File::create(&tar_path)?;
        packager.package(&paths, file)?;

        if let Ok(metadata) = std::fs::metadata(&tar_path) {
            check_context_size(metadata.len());
        }

        tracing::debug!("Build context created: {}", tar_path.display());
        Ok(tar_path)
    }

    /// 資格情報ConfigMapを発行（同名があれば置き換え）
    async fn ensure_credentials_map(&self, config_maps: &Api<ConfigMap>) -> Result<()> {
        let desired = auth::credentials_config_map(&self.credentials);

        match config_maps.get_opt(auth::CREDENTIALS_MAP_NAME).await? {
            Some(existing) => {
                // 同一Namespaceでの連続実行を許容するため更新扱いにする
                let mut replacement = desired;
                replacement.metadata.resource_version = existing.metadata.resource_version;
                config_maps
                    .replace(auth::CREDENTIALS_MAP_NAME, &PostParams::default(), &replacement)
                    .await?;
            }
            None => {
                config_maps.create(&PostParams::default(), &desired).await?;
            }
        }

        Ok(())
    }

    async fn cleanup(
        &self,
        client: &kube::Client,
        pods: &Api<Pod>,
        config_maps: &Api<ConfigMap>,
        source: &dyn ContextSource,
        scratch: &Scratch,
    ) {
        if let Some(pod_name) = &scratch.pod_name {
            tracing::info!("Deleting build pod...");
            let params = DeleteParams::default().grace_period(0);
            if let Err(e) = pods.delete(pod_name, &params).await {
                tracing::error!("failed to delete build pod {}: {}", pod_name, e);
            }
        }

        tracing::info!("Deleting credentials map");
        if let Err(e) = config_maps
            .delete(auth::CREDENTIALS_MAP_NAME, &DeleteParams::default())
            .await
        {
            tracing::error!("failed to delete credentials map: {}", e);
        }

        if scratch.delivery_prepared {
            source.cleanup(client, &self.namespace).await;
        }

        if let Some(tar_path) = &scratch.tar_path {
            if let Err(e) = std::fs::remove_file(tar_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::error!("failed to remove context archive: {}", e);
                }
            }
        }
    }
}

/// 終了状態から結果を導出する
///
/// 成否の判定材料はコンテナの終了理由のみ。"Error" は非ゼロ終了を
/// 意味し、それ以外の理由は成功として扱う。
fn outcome_from_terminal_state(state: &ContainerStateTerminated) -> BuildOutcome {
    if state.reason.as_deref() == Some("Error") {
        BuildOutcome::Failed {
            reason: format!("Error (exit code {})", state.exit_code),
        }
    } else {
        BuildOutcome::Succeeded
    }
}

fn check_context_size(size: u64) {
    if size > MAX_CONTEXT_SIZE {
        tracing::warn!(
            "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
             .dockerignoreファイルで不要なファイルを除外することを推奨します。",
            size / 1024 / 1024
        );
    }
}
