use colored::Colorize;
use gantry_build::{Build, BuildOutcome, ContextSource, LocalSource, S3Source};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub struct BuildOptions {
    pub source: Option<String>,
    pub dockerfile: PathBuf,
    pub workdir: PathBuf,
    pub namespace: String,
    pub tags: Vec<String>,
    pub build_args: Vec<String>,
    pub cache: bool,
    pub cache_repo: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bucket: Option<String>,
    pub s3_region: Option<String>,
}

/// buildコマンドを処理
pub async fn handle(options: BuildOptions) -> anyhow::Result<()> {
    // destinationタグの事前バリデーション
    for tag in &options.tags {
        gantry_build::reference::validate_reference(tag)?;
    }

    let build_args = parse_build_args(&options.build_args)?;

    // Dockerfileの存在チェックはクラスタに触る前に行う
    let dockerfile_path = options.workdir.join(&options.dockerfile);
    if !dockerfile_path.exists() {
        anyhow::bail!(
            "Dockerfileが見つかりません: {}",
            dockerfile_path.display()
        );
    }

    // 受け渡し方式の選択
    let source: Box<dyn ContextSource> = match options.source.as_deref() {
        Some("s3") => {
            let Some(bucket) = options.bucket.clone() else {
                anyhow::bail!("s3方式では --bucket の指定が必要です");
            };
            println!("{}", "s3のコンテキストソースを使用します".blue());
            Box::new(S3Source::new(bucket, options.s3_region.clone()))
        }
        Some("local") | None => {
            println!("{}", "ローカルのコンテキストソースを使用します".blue());
            Box::new(LocalSource)
        }
        Some(other) => {
            anyhow::bail!("不明なコンテキストソースです: {}", other);
        }
    };

    // レジストリ資格情報の取得
    let credentials = match (&options.username, &options.password) {
        (Some(username), Some(password)) => {
            println!("{}", "フラグの認証情報を使用します".blue());
            let registry = gantry_build::auth::guess_registry_from_tag(&options.tags[0]);
            gantry_build::auth::credentials_from_flags(username, password, &registry)?
        }
        _ => {
            println!("{}", "~/.docker/config.json の認証情報を使用します".blue());
            gantry_build::auth::credentials_from_docker_config()?
        }
    };

    if options.cache {
        tracing::info!("Run-Step caching is enabled.");
    } else {
        tracing::info!("Run-Step caching is disabled.");
    }
    println!("Namespace: {}", options.namespace.cyan());

    // Ctrl-C でポーリングとログ追跡を畳み、後始末だけ走らせる
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let client = gantry_kube::client().await?;

    let build = Build {
        image_tags: options.tags,
        work_dir: options.workdir,
        dockerfile_path: options.dockerfile,
        cache: options.cache,
        cache_repo: options.cache_repo,
        namespace: options.namespace,
        build_args,
        credentials,
    };

    match build.start_build(&client, source.as_ref(), &cancel).await {
        Ok(BuildOutcome::Succeeded) => {
            println!("{}", "✓ ビルドが完了しました".green().bold());
            Ok(())
        }
        Ok(BuildOutcome::Cancelled) => {
            println!("{}", "ビルドはキャンセルされました".yellow());
            Ok(())
        }
        // ビルド自体の失敗はインフラ障害と区別して報告する
        Ok(BuildOutcome::Failed { reason }) => {
            Err(anyhow::anyhow!("ビルドに失敗しました ({})", reason))
        }
        Err(e) => Err(e.into()),
    }
}

/// `KEY=VALUE` 形式のビルド引数をパース（記述順を保持）
fn parse_build_args(raw: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    raw.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| {
                    anyhow::anyhow!("ビルド引数は KEY=VALUE 形式で指定してください: {}", arg)
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_args() {
        let args = parse_build_args(&["A=1".to_string(), "B=two".to_string()]).unwrap();
        assert_eq!(
            args,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_build_args_keeps_order() {
        let args = parse_build_args(&["Z=1".to_string(), "A=2".to_string()]).unwrap();
        assert_eq!(args[0].0, "Z");
        assert_eq!(args[1].0, "A");
    }

    #[test]
    fn test_parse_build_args_invalid() {
        let result = parse_build_args(&["no-key-value".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_build_args_value_with_equals() {
        let args = parse_build_args(&["URL=https://example.com?a=b".to_string()]).unwrap();
        assert_eq!(args[0].1, "https://example.com?a=b");
    }
}
