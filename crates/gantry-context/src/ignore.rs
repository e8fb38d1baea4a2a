//! .dockerignore 規則の読み込みと照合
//!
//! 規則は記述順に評価され、最後にマッチしたパターンが勝つ。
//! `!` 始まりのパターンは直前の除外を打ち消す。

use crate::error::{ContextError, Result};
use glob::{MatchOptions, Pattern};
use std::path::Path;

const IGNORE_FILE_NAME: &str = ".dockerignore";

struct IgnorePattern {
    pattern: Pattern,
    /// 正規化済みのパターン文字列（`!` を除く）
    raw: String,
    negated: bool,
}

/// 順序付きの除外規則集合
pub struct IgnoreRuleSet {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreRuleSet {
    /// 作業ディレクトリの .dockerignore を読み込む
    ///
    /// ファイルが無い場合は空の規則集合を返す。規則がある場合、
    /// .dockerignore 自身は常に除外対象に加わる。
    pub fn load(work_dir: &Path) -> Result<Self> {
        let path = work_dir.join(IGNORE_FILE_NAME);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    patterns: Vec::new(),
                });
            }
            Err(e) => return Err(ContextError::IgnoreFile { path, source: e }),
        };

        let mut lines: Vec<&str> = content.lines().collect();
        lines.push(IGNORE_FILE_NAME);
        Self::from_lines(&lines)
    }

    /// パターン行の列から規則集合を構築
    pub fn from_lines(lines: &[&str]) -> Result<Self> {
        let mut patterns = Vec::new();

        for line in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negated, text) = match line.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, line),
            };

            // 先頭の `./` と末尾の `/` は除いて比較する
            let cleaned = text
                .trim_start_matches("./")
                .trim_end_matches('/')
                .to_string();
            if cleaned.is_empty() {
                continue;
            }

            let pattern =
                Pattern::new(&cleaned).map_err(|e| ContextError::InvalidIgnorePattern {
                    pattern: cleaned.clone(),
                    source: e,
                })?;

            patterns.push(IgnorePattern {
                pattern,
                raw: cleaned,
                negated,
            });
        }

        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 否定パターンを1つでも含むか
    pub fn has_negations(&self) -> bool {
        self.patterns.iter().any(|p| p.negated)
    }

    /// 指定ディレクトリ配下を指す否定パターンがあるか
    ///
    /// 除外されたディレクトリでも、この場合は丸ごとスキップせずに
    /// 中を走査する必要がある。
    pub fn negation_inside(&self, dir_rel: &str) -> bool {
        let prefix = format!("{}/", dir_rel);
        self.patterns
            .iter()
            .filter(|p| p.negated)
            .any(|p| format!("{}/", p.raw).starts_with(&prefix))
    }

    /// 相対パスが除外対象かどうか（最後にマッチした規則が勝つ）
    pub fn is_excluded(&self, rel: &str) -> bool {
        let mut excluded = false;
        for pattern in &self.patterns {
            if matches_path_or_parent(&pattern.pattern, rel) {
                excluded = !pattern.negated;
            }
        }
        excluded
    }
}

/// パターンがパス自身または親ディレクトリにマッチするか
///
/// `vendor` のようなディレクトリパターンは `vendor/a/b.txt` も除外する。
fn matches_path_or_parent(pattern: &Pattern, rel: &str) -> bool {
    // `*` がパス区切りを跨がないDocker流のマッチング。`**` は跨ぐ。
    let options = MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::default()
    };

    let mut prefix = String::new();
    for component in rel.split('/') {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(component);
        if pattern.matches_with(&prefix, options) {
            return true;
        }
    }
    false
}
