//! ビルドコンテナのログストリーミング
//!
//! followモードのログをstdoutへ転送する。コンテナ起動前で
//! ストリームを開けない間は一定間隔で再試行し、打ち切りは
//! 外部の停止要求のみ。停止までに1行も読めていなければ、
//! 蓄積分を非followで1度だけ取得して出力する（コンテナが
//! 既に終了していた場合の取りこぼし対策）。

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, LogParams};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) async fn stream_build_logs(
    pods: Api<Pod>,
    pod_name: String,
    container: String,
    cancel: CancellationToken,
) {
    use futures_util::{AsyncBufReadExt, TryStreamExt};

    let mut lines_read: u64 = 0;

    'retry: loop {
        if cancel.is_cancelled() {
            break;
        }

        let params = LogParams {
            container: Some(container.clone()),
            follow: true,
            ..Default::default()
        };

        match pods.log_stream(&pod_name, &params).await {
            Ok(stream) => {
                let mut lines = stream.lines();
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'retry,
                        next = lines.try_next() => match next {
                            Ok(Some(line)) => {
                                lines_read += 1;
                                println!("{}", line);
                            }
                            Ok(None) => break 'retry,
                            Err(e) => {
                                tracing::debug!("log stream interrupted: {}", e);
                                break 'retry;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                // Podがまだ初期化中の間は開けない
                tracing::debug!("log stream not ready: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break 'retry,
                    _ = tokio::time::sleep(RETRY_INTERVAL) => {}
                }
            }
        }
    }

    // 1行も流せずに終わった場合の補償取得
    if lines_read == 0 {
        let params = LogParams {
            container: Some(container),
            ..Default::default()
        };
        match pods.logs(&pod_name, &params).await {
            Ok(logs) if !logs.is_empty() => print!("{}", logs),
            Ok(_) => {}
            Err(e) => tracing::debug!("fallback log fetch failed: {}", e),
        }
    }
}
