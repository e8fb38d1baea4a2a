//! ARG/ENV の変数スコープと展開

use std::collections::HashMap;

/// 命令走査中に蓄積される変数スコープ
///
/// ARGのデフォルト値は呼び出し側の --build-arg に上書きされ、
/// 同名の衝突では ENV が常に ARG より優先される。
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    args: HashMap<String, String>,
    envs: HashMap<String, String>,
}

impl VariableScope {
    /// 呼び出し側のビルド引数からスコープを初期化
    pub fn with_build_args(build_args: &[(String, String)]) -> Self {
        Self {
            args: build_args.iter().cloned().collect(),
            envs: HashMap::new(),
        }
    }

    /// ARG宣言を処理
    ///
    /// 呼び出し側の値が既にあればそれを保持する。値が確定できた場合に
    /// trueを返す（falseは必須ARG未指定）。
    pub fn declare_arg(&mut self, name: &str, default: Option<&str>) -> bool {
        if self.args.contains_key(name) {
            return true;
        }
        if let Some(value) = default {
            self.args.insert(name.to_string(), value.to_string());
            return true;
        }
        false
    }

    /// ENVは無条件で設定される
    pub fn set_env(&mut self, key: &str, value: &str) {
        self.envs.insert(key.to_string(), value.to_string());
    }

    /// ENV優先で値を引く
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.envs
            .get(name)
            .or_else(|| self.args.get(name))
            .map(String::as_str)
    }

    /// `$NAME` / `${NAME}` 形式のシェル風展開
    ///
    /// 未定義の変数は空文字列に展開される。`\$` はリテラルの `$`。
    pub fn expand(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some('$')) => {
                    chars.next();
                    out.push('$');
                }
                '$' => {
                    let name = match chars.peek() {
                        Some('{') => {
                            chars.next();
                            let mut name = String::new();
                            for c in chars.by_ref() {
                                if c == '}' {
                                    break;
                                }
                                name.push(c);
                            }
                            name
                        }
                        _ => {
                            let mut name = String::new();
                            while let Some(&c) = chars.peek() {
                                if c.is_ascii_alphanumeric() || c == '_' {
                                    name.push(c);
                                    chars.next();
                                } else {
                                    break;
                                }
                            }
                            name
                        }
                    };

                    if name.is_empty() {
                        out.push('$');
                    } else {
                        out.push_str(self.lookup(&name).unwrap_or(""));
                    }
                }
                c => out.push(c),
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> VariableScope {
        let mut s = VariableScope::with_build_args(&[("VERSION".to_string(), "1.2".to_string())]);
        s.set_env("NAME", "app");
        s
    }

    #[test]
    fn test_expand_plain() {
        assert_eq!(scope().expand("src/main.go"), "src/main.go");
    }

    #[test]
    fn test_expand_dollar_and_braces() {
        let s = scope();
        assert_eq!(s.expand("app-$VERSION.txt"), "app-1.2.txt");
        assert_eq!(s.expand("app-${VERSION}.txt"), "app-1.2.txt");
    }

    #[test]
    fn test_expand_unknown_is_empty() {
        assert_eq!(scope().expand("$UNKNOWN/file"), "/file");
    }

    #[test]
    fn test_expand_escaped_dollar() {
        assert_eq!(scope().expand("\\$VERSION"), "$VERSION");
    }

    #[test]
    fn test_env_shadows_arg() {
        let mut s = VariableScope::with_build_args(&[("NAME".to_string(), "from-arg".to_string())]);
        assert_eq!(s.lookup("NAME"), Some("from-arg"));

        s.set_env("NAME", "from-env");
        assert_eq!(s.lookup("NAME"), Some("from-env"));
        assert_eq!(s.expand("$NAME"), "from-env");
    }

    #[test]
    fn test_declare_arg_caller_value_wins() {
        let mut s = scope();
        assert!(s.declare_arg("VERSION", Some("9.9")));
        assert_eq!(s.lookup("VERSION"), Some("1.2"));
    }

    #[test]
    fn test_declare_arg_without_value() {
        let mut s = VariableScope::default();
        assert!(!s.declare_arg("MISSING", None));
        assert!(s.declare_arg("WITH_DEFAULT", Some("x")));
        assert_eq!(s.lookup("WITH_DEFAULT"), Some("x"));
    }
}
