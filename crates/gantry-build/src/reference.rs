//! イメージ参照の分解とバリデーション

use crate::error::{BuildError, Result};

/// イメージ名とタグを分離
///
/// # Examples
/// - `ghcr.io/org/app:v1.0` -> `("ghcr.io/org/app", "v1.0")`
/// - `ghcr.io/org/app` -> `("ghcr.io/org/app", "latest")`
/// - `localhost:5000/app:dev` -> `("localhost:5000/app", "dev")`
pub fn split_image_tag(image: &str) -> (String, String) {
    // 最後の : を探す
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // ポート番号（localhost:5000/app）はタグではない
        if !potential_tag.contains('/') && !potential_tag.chars().all(|c| c.is_ascii_digit()) {
            return (potential_image.to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}

/// イメージ参照をレジストリとリポジトリに分解
///
/// レジストリ修飾がない場合はDocker Hubの正規形に合わせる
/// （`nginx` -> `index.docker.io` / `library/nginx`）。
pub fn registry_and_repository(image: &str) -> (String, String) {
    let (name, _tag) = split_image_tag(image);

    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') {
            return (first.to_string(), rest.to_string());
        }
    }

    let repository = if name.contains('/') {
        name
    } else {
        format!("library/{}", name)
    };
    ("index.docker.io".to_string(), repository)
}

/// キャッシュリポジトリのデフォルト値
///
/// 最初のdestinationタグから `<registry>/<repository>cache` を導出する。
pub fn default_cache_repo(first_tag: &str) -> String {
    let (registry, repository) = registry_and_repository(first_tag);
    format!("{}/{}cache", registry, repository)
}

/// destinationタグの事前バリデーション
///
/// ビルドを始める前に明らかに不正な参照を弾く。タグの制約は
/// 128文字以下・英数字とピリオド/ハイフン/アンダースコアのみ。
pub fn validate_reference(reference: &str) -> Result<()> {
    if reference.is_empty() {
        return Err(BuildError::InvalidReference("(empty)".to_string()));
    }

    let (name, tag) = split_image_tag(reference);

    if name.is_empty() {
        return Err(BuildError::InvalidReference(reference.to_string()));
    }

    for c in name.chars() {
        let allowed = c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || matches!(c, '.' | '-' | '_' | '/' | ':');
        if !allowed {
            return Err(BuildError::InvalidReference(format!(
                "invalid character '{}' in {}",
                c, reference
            )));
        }
    }

    if tag.len() > 128 || tag.starts_with('.') || tag.starts_with('-') {
        return Err(BuildError::InvalidReference(reference.to_string()));
    }
    for c in tag.chars() {
        if !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_') {
            return Err(BuildError::InvalidReference(format!(
                "invalid character '{}' in tag of {}",
                c, reference
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image_tag_with_tag() {
        let (image, tag) = split_image_tag("ghcr.io/org/app:v1.0");
        assert_eq!(image, "ghcr.io/org/app");
        assert_eq!(tag, "v1.0");
    }

    #[test]
    fn test_split_image_tag_without_tag() {
        let (image, tag) = split_image_tag("ghcr.io/org/app");
        assert_eq!(image, "ghcr.io/org/app");
        assert_eq!(tag, "latest");
    }

    #[test]
    fn test_split_image_tag_with_port() {
        let (image, tag) = split_image_tag("localhost:5000/app");
        assert_eq!(image, "localhost:5000/app");
        assert_eq!(tag, "latest");
    }

    #[test]
    fn test_registry_and_repository_qualified() {
        assert_eq!(
            registry_and_repository("ghcr.io/org/app:v1.0"),
            ("ghcr.io".to_string(), "org/app".to_string())
        );
        assert_eq!(
            registry_and_repository("localhost:5000/app"),
            ("localhost:5000".to_string(), "app".to_string())
        );
    }

    #[test]
    fn test_registry_and_repository_docker_hub() {
        assert_eq!(
            registry_and_repository("myuser/app:dev"),
            ("index.docker.io".to_string(), "myuser/app".to_string())
        );
        assert_eq!(
            registry_and_repository("nginx"),
            ("index.docker.io".to_string(), "library/nginx".to_string())
        );
    }

    #[test]
    fn test_default_cache_repo() {
        assert_eq!(
            default_cache_repo("ghcr.io/org/app:v1.0"),
            "ghcr.io/org/appcache"
        );
        assert_eq!(
            default_cache_repo("nginx"),
            "index.docker.io/library/nginxcache"
        );
    }

    #[test]
    fn test_validate_reference_ok() {
        assert!(validate_reference("ghcr.io/org/app:v1.0").is_ok());
        assert!(validate_reference("localhost:5000/app").is_ok());
        assert!(validate_reference("myuser/app").is_ok());
    }

    #[test]
    fn test_validate_reference_rejects_uppercase_name() {
        assert!(validate_reference("ghcr.io/Org/app:v1").is_err());
    }

    #[test]
    fn test_validate_reference_rejects_bad_tag() {
        assert!(validate_reference("app:-v1").is_err());
        assert!(validate_reference("").is_err());
    }
}
