//! コンテキスト受け渡し戦略
//!
//! パッケージ済みコンテキストをビルドエージェントが読める場所へ
//! 届ける方法の抽象。Podスペックの書き換え・配送用資格情報の発行・
//! アップロードと準備完了の通知・ビルド後の掃除の4つの能力を持ち、
//! 新しい受け渡し方式はオーケストレータに手を入れずに追加できる。

mod local;
mod s3;

pub use local::LocalSource;
pub use s3::S3Source;

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use std::path::Path;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ContextSource: Send + Sync {
    /// 戦略名（ログ・表示用）
    fn name(&self) -> &'static str;

    /// スケジューリング前にPodスペックを書き換える
    fn modify_pod(&self, pod: &mut Pod);

    /// 配送に必要な資格情報をクラスタへ発行する
    async fn prepare_credentials(&self, client: &kube::Client, namespace: &str) -> Result<()>;

    /// アップロードがPodの存在を前提とするか
    ///
    /// trueならスケジューリング後（init段階）にアップロードし、
    /// falseならスケジューリング前にアップロードを完了させる。
    fn requires_pod(&self) -> bool;

    /// コンテキストをアップロードし、準備完了を通知する
    async fn upload_context(
        &self,
        client: &kube::Client,
        namespace: &str,
        pod_name: &str,
        tar_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// ビルド後の掃除
    ///
    /// ベストエフォート。失敗はログに残すだけで呼び出し元の結果を
    /// 変えてはならない。
    async fn cleanup(&self, client: &kube::Client, namespace: &str);
}
