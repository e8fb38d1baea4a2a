//! Gantry のリモートビルド機能
//!
//! kaniko Podの組み立てと監視、レジストリ資格情報の発行、
//! ビルドコンテキストの受け渡し戦略を提供する。実際のイメージ
//! 構築はクラスタ内のkaniko executorに委譲され、このcrateは
//! その前後の供給と後始末に責任を持つ。

pub mod auth;
pub mod builder;
pub mod error;
mod logs;
pub mod pod;
pub mod progress;
pub mod reference;
pub mod source;

pub use builder::{Build, BuildOutcome};
pub use error::{BuildError, Result};
pub use progress::BuildProgress;
pub use source::{ContextSource, LocalSource, S3Source};
