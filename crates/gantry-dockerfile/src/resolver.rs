//! ビルド依存パスの解決
//!
//! Dockerfileを走査し、COPY/ADD が参照するローカルパスを
//! 変数展開・glob展開したうえで収集する。コンテキスト外への
//! 参照はエラーとして弾く。

use crate::error::{DockerfileError, Result};
use crate::parser::{self, Instruction, Keyword};
use crate::vars::VariableScope;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Dockerfileからビルドに必要なファイル集合を静的に解決する
pub struct Resolver {
    work_dir: PathBuf,
}

impl Resolver {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// ビルドが必要とするパスの一覧を返す
    ///
    /// 返り値はプロセスのカレントディレクトリ起点の相対パスで、
    /// 初出順・重複なし。Dockerfile自身は常に含まれる。
    pub fn resolve(
        &self,
        dockerfile: &Path,
        build_args: &[(String, String)],
    ) -> Result<Vec<PathBuf>> {
        let dockerfile_path = self.work_dir.join(dockerfile);
        let source = std::fs::read_to_string(&dockerfile_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DockerfileError::NotFound(dockerfile_path.clone())
            } else {
                DockerfileError::Read {
                    path: dockerfile_path.clone(),
                    source: e,
                }
            }
        })?;

        let instructions = parser::parse(&source)?;

        let cwd = std::env::current_dir()?;
        let work_abs = absolute(&self.work_dir, &cwd);

        let mut scope = VariableScope::with_build_args(build_args);
        let mut seen = HashSet::new();
        let mut paths = Vec::new();

        for instruction in &instructions {
            match &instruction.keyword {
                Keyword::Arg => handle_arg(instruction, &mut scope)?,
                Keyword::Env => handle_env(instruction, &mut scope)?,
                Keyword::Copy | Keyword::Add => {
                    for path in source_paths(instruction, &scope, &work_abs, &cwd)? {
                        if seen.insert(path.clone()) {
                            paths.push(path);
                        }
                    }
                }
                Keyword::Other(_) => {}
            }
        }

        // Dockerfile自身は常にコンテキストに含める
        let dockerfile_rel = relative_to(&cwd, &absolute(&dockerfile_path, &cwd));
        if seen.insert(dockerfile_rel.clone()) {
            paths.push(dockerfile_rel);
        }

        Ok(paths)
    }
}

/// ARG宣言の処理。必須ARGが未指定ならその行でエラーにする
fn handle_arg(instruction: &Instruction, scope: &mut VariableScope) -> Result<()> {
    if instruction.operands.is_empty() {
        return Err(DockerfileError::Parse {
            line: instruction.line,
            message: "ARG requires a name".to_string(),
        });
    }

    for operand in &instruction.operands {
        let declared = match operand.split_once('=') {
            Some((name, default)) => scope.declare_arg(name, Some(default)),
            None => scope.declare_arg(operand, None),
        };
        if !declared {
            return Err(DockerfileError::MissingBuildArg {
                name: operand.clone(),
                line: instruction.line,
            });
        }
    }

    Ok(())
}

fn handle_env(instruction: &Instruction, scope: &mut VariableScope) -> Result<()> {
    let operands = &instruction.operands;
    if operands.is_empty() {
        return Err(DockerfileError::Parse {
            line: instruction.line,
            message: "ENV requires a key and a value".to_string(),
        });
    }

    // `ENV key=value [key=value...]` と `ENV key value` の両形式
    if operands[0].contains('=') {
        for operand in operands {
            let Some((key, value)) = operand.split_once('=') else {
                return Err(DockerfileError::Parse {
                    line: instruction.line,
                    message: format!("invalid ENV assignment: {}", operand),
                });
            };
            scope.set_env(key, value);
        }
    } else {
        if operands.len() < 2 {
            return Err(DockerfileError::Parse {
                line: instruction.line,
                message: "ENV requires a value".to_string(),
            });
        }
        scope.set_env(&operands[0], &operands[1..].join(" "));
    }

    Ok(())
}

/// COPY/ADD 1命令分のソースパスを展開する
fn source_paths(
    instruction: &Instruction,
    scope: &VariableScope,
    work_abs: &Path,
    cwd: &Path,
) -> Result<Vec<PathBuf>> {
    // 別ステージからのコピーはローカルコンテキストに寄与しない
    if instruction.flags.iter().any(|f| f.starts_with("--from")) {
        return Ok(Vec::new());
    }

    if instruction.operands.len() < 2 {
        return Err(DockerfileError::Parse {
            line: instruction.line,
            message: "COPY/ADD requires at least one source and a destination".to_string(),
        });
    }

    let mut paths = Vec::new();
    let (sources, _destination) = instruction
        .operands
        .split_at(instruction.operands.len() - 1);

    for operand in sources {
        // リモートURLはビルドエージェント側で取得される
        if operand.starts_with("http://") || operand.starts_with("https://") {
            tracing::info!("Skipping external dependency {}", operand);
            continue;
        }

        let expanded = scope.expand(operand);
        // 絶対パス指定はコンテキストルート起点として扱う
        let relative = expanded.trim_start_matches('/');
        let pattern_path = normalize(&work_abs.join(relative));
        let pattern = pattern_path.to_string_lossy().into_owned();

        let matches = glob::glob(&pattern).map_err(|e| DockerfileError::InvalidGlob {
            line: instruction.line,
            pattern: pattern.clone(),
            source: e,
        })?;

        for entry in matches {
            let path = entry.map_err(|e| DockerfileError::Io(e.into_error()))?;
            let path = normalize(&path);

            let rel = relative_to(work_abs, &path);
            if rel.starts_with("..") {
                return Err(DockerfileError::ContextEscape {
                    line: instruction.line,
                    operand: operand.clone(),
                });
            }

            // 後段のI/Oはプロセスのカレントディレクトリ起点で行う
            paths.push(relative_to(cwd, &path));
        }
    }

    Ok(paths)
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

/// baseからtargetへの字句的な相対パス
fn relative_to(base: &Path, target: &Path) -> PathBuf {
    let base_components: Vec<_> = base.components().collect();
    let target_components: Vec<_> = target.components().collect();

    let common = base_components
        .iter()
        .zip(&target_components)
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component.as_os_str());
    }

    if result.as_os_str().is_empty() {
        result.push(".");
    }

    result
}
