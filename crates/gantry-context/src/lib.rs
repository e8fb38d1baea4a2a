//! ビルドコンテキストのパッケージング
//!
//! 依存解決済みのファイル集合を、.dockerignore の除外規則を
//! 適用しながら決定的な順序のtar.gzアーカイブに書き出す。

pub mod archive;
pub mod error;
pub mod ignore;

pub use archive::Packager;
pub use error::{ContextError, Result};
pub use ignore::IgnoreRuleSet;
