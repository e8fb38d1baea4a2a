//! tar.gz アーカイブの書き出し
//!
//! エントリ名は作業ディレクトリからの相対パス（スラッシュ区切り）。
//! 通常ファイルのみを書き出し、ディレクトリヘッダは書かない。
//! 同一スナップショットに対して常に同じエントリ順になる。

use crate::error::{ContextError, Result};
use crate::ignore::IgnoreRuleSet;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// 解決済みパス集合をアーカイブに書き出すパッケージャ
pub struct Packager {
    work_dir: PathBuf,
    ignore: IgnoreRuleSet,
}

impl Packager {
    pub fn new(work_dir: impl Into<PathBuf>, ignore: IgnoreRuleSet) -> Self {
        Self {
            work_dir: work_dir.into(),
            ignore,
        }
    }

    /// パス集合をgzip圧縮tarとしてwriterに書き出す
    ///
    /// ディレクトリは再帰的に展開し、各エントリは除外規則を
    /// 通過したものだけが含まれる。
    pub fn package<W: Write>(&self, paths: &[PathBuf], writer: W) -> Result<()> {
        let encoder = GzEncoder::new(writer, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let cwd = std::env::current_dir()?;
        let work_abs = absolute(&self.work_dir, &cwd);

        for path in paths {
            let abs = absolute(path, &cwd);
            let metadata = std::fs::symlink_metadata(&abs).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ContextError::Vanished(path.clone())
                } else {
                    ContextError::Io(e)
                }
            })?;

            if metadata.is_dir() {
                self.append_dir(&mut builder, &abs, &work_abs)?;
            } else {
                let name = entry_name(&work_abs, &abs)?;
                if self.ignore.is_excluded(&name) {
                    continue;
                }
                if !metadata.file_type().is_file() {
                    // シンボリックリンク・デバイス等は黙って除外
                    continue;
                }
                builder.append_path_with_name(&abs, &name)?;
            }
        }

        let encoder = builder.into_inner()?;
        encoder.finish()?;
        Ok(())
    }

    /// ディレクトリを決定的な順序（名前順）で再帰的に追加する
    fn append_dir<W: Write>(
        &self,
        builder: &mut tar::Builder<GzEncoder<W>>,
        dir: &Path,
        work_abs: &Path,
    ) -> Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type()?;
            let name = entry_name(work_abs, &path)?;

            if file_type.is_dir() {
                if self.ignore.is_excluded(&name)
                    && !(self.ignore.has_negations() && self.ignore.negation_inside(&name))
                {
                    // 配下に否定パターンが無ければサブツリーごとスキップ
                    tracing::debug!("Skipping excluded directory {}", name);
                    continue;
                }
                self.append_dir(builder, &path, work_abs)?;
            } else {
                if self.ignore.is_excluded(&name) {
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                builder.append_path_with_name(&path, &name)?;
            }
        }

        Ok(())
    }
}

/// 作業ディレクトリ相対・スラッシュ区切りのエントリ名
fn entry_name(work_abs: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(work_abs)
        .map_err(|_| ContextError::OutsideContext(path.to_path_buf()))?;

    let mut name = String::new();
    for component in rel.components() {
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    Ok(name)
}

/// 字句的な正規化（`.`/`..` を解決、シンボリックリンクは辿らない）
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir) => {}
                _ => result.push(".."),
            },
            other => result.push(other.as_os_str()),
        }
    }
    result
}

fn absolute(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&cwd.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// アーカイブを展開してエントリ名の一覧を返す
    fn entry_names(archive: &[u8]) -> Vec<String> {
        let decoder = flate2::read::GzDecoder::new(archive);
        let mut tar = tar::Archive::new(decoder);
        tar.entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    fn package(work_dir: &Path, paths: &[PathBuf]) -> Vec<u8> {
        let ignore = IgnoreRuleSet::load(work_dir).unwrap();
        let packager = Packager::new(work_dir, ignore);
        let mut buffer = Vec::new();
        packager.package(paths, &mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_package_resolved_files() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("app.go"), "package main").unwrap();
        fs::write(temp_dir.path().join("Dockerfile"), "FROM alpine").unwrap();

        let paths = vec![
            temp_dir.path().join("app.go"),
            temp_dir.path().join("Dockerfile"),
        ];
        let archive = package(temp_dir.path(), &paths);

        assert_eq!(entry_names(&archive), vec!["app.go", "Dockerfile"]);
    }

    #[test]
    fn test_package_directory_recursive_sorted() {
        let temp_dir = tempdir().unwrap();
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("b.rs"), "b").unwrap();
        fs::write(src.join("a.rs"), "a").unwrap();
        fs::write(src.join("sub/c.rs"), "c").unwrap();

        let archive = package(temp_dir.path(), &[src.clone()]);

        assert_eq!(
            entry_names(&archive),
            vec!["src/a.rs", "src/b.rs", "src/sub/c.rs"]
        );
    }

    #[test]
    fn test_package_is_deterministic() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("dir")).unwrap();
        for name in ["z.txt", "a.txt", "m.txt"] {
            fs::write(temp_dir.path().join("dir").join(name), name).unwrap();
        }

        let paths = vec![temp_dir.path().join("dir")];
        let first = package(temp_dir.path(), &paths);
        let second = package(temp_dir.path(), &paths);

        assert_eq!(entry_names(&first), entry_names(&second));
        assert_eq!(
            entry_names(&first),
            vec!["dir/a.txt", "dir/m.txt", "dir/z.txt"]
        );
    }

    #[test]
    fn test_excluded_directory_skipped_wholesale() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join(".dockerignore"), "target\n").unwrap();
        fs::create_dir(temp_dir.path().join("target")).unwrap();
        fs::write(temp_dir.path().join("target/out.bin"), "bin").unwrap();
        fs::write(temp_dir.path().join("main.rs"), "fn main() {}").unwrap();

        let archive = package(temp_dir.path(), &[temp_dir.path().to_path_buf()]);

        assert_eq!(entry_names(&archive), vec!["main.rs"]);
    }

    #[test]
    fn test_negation_beneath_excluded_directory() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join(".dockerignore"),
            "logs\n!logs/keep.txt\n",
        )
        .unwrap();
        fs::create_dir(temp_dir.path().join("logs")).unwrap();
        fs::write(temp_dir.path().join("logs/keep.txt"), "keep").unwrap();
        fs::write(temp_dir.path().join("logs/drop.txt"), "drop").unwrap();

        let archive = package(temp_dir.path(), &[temp_dir.path().to_path_buf()]);

        assert_eq!(entry_names(&archive), vec!["logs/keep.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_silently_omitted() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("real.txt"), "real").unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("real.txt"),
            temp_dir.path().join("link.txt"),
        )
        .unwrap();

        let archive = package(temp_dir.path(), &[temp_dir.path().to_path_buf()]);

        assert_eq!(entry_names(&archive), vec!["real.txt"]);
    }

    #[test]
    fn test_vanished_source_is_fatal() {
        let temp_dir = tempdir().unwrap();
        let ignore = IgnoreRuleSet::load(temp_dir.path()).unwrap();
        let packager = Packager::new(temp_dir.path(), ignore);

        let mut buffer = Vec::new();
        let result = packager.package(
            &[temp_dir.path().join("missing.txt")],
            &mut buffer,
        );

        assert!(matches!(result, Err(ContextError::Vanished(_))));
    }

    #[test]
    fn test_dockerignore_itself_not_packaged() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join(".dockerignore"), "*.tmp\n").unwrap();
        fs::write(temp_dir.path().join("main.rs"), "fn main() {}").unwrap();
        fs::write(temp_dir.path().join("scratch.tmp"), "x").unwrap();

        let archive = package(temp_dir.path(), &[temp_dir.path().to_path_buf()]);

        assert_eq!(entry_names(&archive), vec!["main.rs"]);
    }
}
