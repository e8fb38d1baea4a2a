//! Dockerfile 依存解決
//!
//! Dockerfileを静的に解析し、ビルドコンテキストに含める必要のある
//! ファイル集合を求める。COPY/ADD の変数展開・glob展開・
//! コンテキスト外参照の検出を担当する。

pub mod error;
pub mod parser;
pub mod resolver;
pub mod vars;

pub use error::{DockerfileError, Result};
pub use parser::{Instruction, Keyword, parse};
pub use resolver::Resolver;
pub use vars::VariableScope;
