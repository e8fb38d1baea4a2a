//! Dockerfile 命令パーサ
//!
//! 行継続・コメント・クオートを処理し、命令ごとにフラグと
//! オペランドを分離した命令列を返す。行番号はエラー表示用に保持する。

use crate::error::{DockerfileError, Result};

/// 命令の種別
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    Copy,
    Add,
    Env,
    Arg,
    /// FROM, RUN など依存解決に関与しない命令
    Other(String),
}

impl Keyword {
    fn from_token(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "COPY" => Keyword::Copy,
            "ADD" => Keyword::Add,
            "ENV" => Keyword::Env,
            "ARG" => Keyword::Arg,
            other => Keyword::Other(other.to_string()),
        }
    }
}

/// パース済みのDockerfile命令
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub keyword: Keyword,
    /// `--from=builder` のような命令フラグ
    pub flags: Vec<String>,
    pub operands: Vec<String>,
    /// 1始まりの行番号（継続行の場合は先頭行）
    pub line: usize,
}

/// Dockerfileを命令列にパース
pub fn parse(source: &str) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    let mut lines = source.lines().enumerate();

    while let Some((idx, raw)) = lines.next() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        // 行継続（末尾 `\`）を1つの論理行に連結する。
        // 継続中のコメント行と空行は読み飛ばす。
        let mut logical = String::new();
        let mut current = trimmed.to_string();
        loop {
            match current.strip_suffix('\\') {
                Some(stripped) => {
                    logical.push_str(stripped.trim_end());
                    logical.push(' ');
                    current = loop {
                        match lines.next() {
                            Some((_, next)) => {
                                let next = next.trim();
                                if next.is_empty() || next.starts_with('#') {
                                    continue;
                                }
                                break next.to_string();
                            }
                            None => break String::new(),
                        }
                    };
                    if current.is_empty() {
                        break;
                    }
                }
                None => {
                    logical.push_str(&current);
                    break;
                }
            }
        }

        let tokens = tokenize(&logical, line_no)?;
        let mut iter = tokens.into_iter();
        let Some(first) = iter.next() else {
            continue;
        };

        let keyword = Keyword::from_token(&first);
        let mut flags = Vec::new();
        let mut operands = Vec::new();
        for token in iter {
            if operands.is_empty() && token.starts_with("--") {
                flags.push(token);
            } else {
                operands.push(token);
            }
        }

        instructions.push(Instruction {
            keyword,
            flags,
            operands,
            line: line_no,
        });
    }

    Ok(instructions)
}

/// 空白区切りのトークン化（ダブルクオート内の空白は保持）
fn tokenize(input: &str, line: usize) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(DockerfileError::Parse {
            line,
            message: "unterminated quote".to_string(),
        });
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let source = "FROM alpine\nCOPY app.go /app/\n";
        let instructions = parse(source).unwrap();

        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].keyword, Keyword::Other("FROM".to_string()));
        assert_eq!(instructions[1].keyword, Keyword::Copy);
        assert_eq!(instructions[1].operands, vec!["app.go", "/app/"]);
        assert_eq!(instructions[1].line, 2);
    }

    #[test]
    fn test_parse_flags() {
        let source = "COPY --from=builder --chown=app /out /app\n";
        let instructions = parse(source).unwrap();

        assert_eq!(instructions[0].flags, vec!["--from=builder", "--chown=app"]);
        assert_eq!(instructions[0].operands, vec!["/out", "/app"]);
    }

    #[test]
    fn test_parse_comments_and_blank_lines() {
        let source = "# comment\n\nENV KEY value\n";
        let instructions = parse(source).unwrap();

        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].keyword, Keyword::Env);
        assert_eq!(instructions[0].line, 3);
    }

    #[test]
    fn test_parse_line_continuation() {
        let source = "RUN apt-get update && \\\n    apt-get install -y curl\nCOPY a b\n";
        let instructions = parse(source).unwrap();

        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].keyword, Keyword::Other("RUN".to_string()));
        assert_eq!(instructions[0].line, 1);
        assert!(instructions[0].operands.contains(&"curl".to_string()));
        assert_eq!(instructions[1].line, 3);
    }

    #[test]
    fn test_parse_continuation_with_comment() {
        let source = "RUN echo a \\\n# interleaved comment\n    && echo b\n";
        let instructions = parse(source).unwrap();

        assert_eq!(instructions.len(), 1);
        assert!(instructions[0].operands.contains(&"b".to_string()));
    }

    #[test]
    fn test_parse_quoted_operand() {
        let source = "ENV GREETING \"hello world\"\n";
        let instructions = parse(source).unwrap();

        assert_eq!(instructions[0].operands, vec!["GREETING", "hello world"]);
    }

    #[test]
    fn test_parse_unterminated_quote() {
        let result = parse("ENV KEY \"unterminated\n");
        assert!(matches!(
            result,
            Err(DockerfileError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_keyword_case_insensitive() {
        let instructions = parse("copy a b\n").unwrap();
        assert_eq!(instructions[0].keyword, Keyword::Copy);
    }
}
