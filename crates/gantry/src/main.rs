mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "コンテキストを積んで、クラスタで組む。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// クラスタ内のkanikoでコンテナイメージをビルド
    Build {
        /// コンテキストの受け渡し方式 (local | s3)
        source: Option<String>,
        /// 作業ディレクトリ内のDockerfileパス
        #[arg(short = 'd', long, default_value = "Dockerfile")]
        dockerfile: PathBuf,
        /// 作業ディレクトリ
        #[arg(short = 'w', long, default_value = ".")]
        workdir: PathBuf,
        /// ビルドを実行するNamespace
        #[arg(short = 'n', long, default_value = "default", env = "GANTRY_NAMESPACE")]
        namespace: String,
        /// 完成イメージのタグ（複数指定可・必須）
        #[arg(short = 't', long = "tag", required = true)]
        tags: Vec<String>,
        /// ビルド引数 (KEY=VALUE)
        #[arg(long = "build-arg", value_name = "KEY=VALUE")]
        build_args: Vec<String>,
        /// RUNステップのキャッシュを有効化
        #[arg(short = 'c', long)]
        cache: bool,
        /// キャッシュイメージのリポジトリ（--cache 参照）
        #[arg(long)]
        cache_repo: Option<String>,
        /// レジストリのユーザー名
        #[arg(short = 'u', long)]
        username: Option<String>,
        /// レジストリのパスワード
        #[arg(short = 'p', long)]
        password: Option<String>,
        /// コンテキストのアップロード先バケット（s3方式）
        #[arg(short = 'b', long)]
        bucket: Option<String>,
        /// バケットのリージョン（s3方式）
        #[arg(long)]
        s3_region: Option<String>,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt::init();

    match cli.command {
        Commands::Version => {
            println!("gantry {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Build {
            source,
            dockerfile,
            workdir,
            namespace,
            tags,
            build_args,
            cache,
            cache_repo,
            username,
            password,
            bucket,
            s3_region,
        } => {
            commands::build::handle(commands::build::BuildOptions {
                source,
                dockerfile,
                workdir,
                namespace,
                tags,
                build_args,
                cache,
                cache_repo,
                username,
                password,
                bucket,
                s3_region,
            })
            .await
        }
    }
}
