//! レジストリ認証情報の組み立て
//!
//! フラグで渡された認証情報、または ~/.docker/config.json を
//! kanikoが読む docker config 形式のConfigMapに変換します。

use crate::error::{BuildError, Result};
use base64::Engine;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// クラスタに発行する資格情報ConfigMapの名前
pub const CREDENTIALS_MAP_NAME: &str = "gantry-docker-config";

/// docker config の "auths" オブジェクト
#[derive(Debug, Serialize)]
struct DockerConfig {
    auths: BTreeMap<String, AuthEntry>,
}

#[derive(Debug, Serialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: String,
}

/// イメージタグからレジストリを推測
///
/// # Examples
/// - `ghcr.io/org/app:v1.0` -> `ghcr.io`
/// - `localhost:5000/app` -> `localhost:5000`
/// - `myuser/app` -> Docker Hub の既知エンドポイント
pub fn guess_registry_from_tag(image_tag: &str) -> String {
    if let Some((first, _rest)) = image_tag.split_once('/') {
        if first.contains('.') || first.contains(':') {
            return first.to_string();
        }
    }

    "https://index.docker.io/v1/".to_string()
}

/// username/password から docker config 形式のJSONを組み立てる
pub fn credentials_from_flags(username: &str, password: &str, registry: &str) -> Result<Vec<u8>> {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));

    let config = DockerConfig {
        auths: BTreeMap::from([(registry.to_string(), AuthEntry { auth: encoded })]),
    };

    serde_json::to_vec(&config).map_err(|e| BuildError::Credentials(e.to_string()))
}

/// ~/.docker/config.json を読み込む
///
/// DOCKER_CONFIG が設定されていればそのディレクトリを優先する。
pub fn credentials_from_docker_config() -> Result<Vec<u8>> {
    let config_dir = std::env::var("DOCKER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".docker"))
                .unwrap_or_else(|| PathBuf::from(".docker"))
        });
    let config_path = config_dir.join("config.json");

    if !config_path.exists() {
        return Err(BuildError::Credentials(format!(
            "docker config not found at {}",
            config_path.display()
        )));
    }

    std::fs::read(&config_path).map_err(|e| {
        BuildError::Credentials(format!("failed to read {}: {}", config_path.display(), e))
    })
}

/// 資格情報をConfigMapとして包む
pub fn credentials_config_map(credentials: &[u8]) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(CREDENTIALS_MAP_NAME.to_string()),
            labels: Some(builder_labels()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "config.json".to_string(),
            String::from_utf8_lossy(credentials).into_owned(),
        )])),
        ..Default::default()
    }
}

/// gantryが作成したリソースに付けるラベル
pub(crate) fn builder_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("builder".to_string(), "gantry".to_string())])
}
