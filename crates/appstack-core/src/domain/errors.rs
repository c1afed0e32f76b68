//! Errors - 合成レイヤーのエラー型
//!
//! # 分類
//! - ComposeError: composer の使い方の誤り、または決着済みの失敗の読み出し
//! - FormatError: 補間入力が不正（本来は起きない = プログラムの欠陥）

use super::ids::ValueId;
use super::state::Failure;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("value {0} is not known to this composer")]
    UnknownValue(ValueId),

    #[error("value `{0}` is already settled")]
    AlreadySettled(String),

    #[error("value `{0}` is derived and cannot be settled from outside")]
    NotExternal(String),

    #[error("value `{0}` is still pending")]
    Unresolved(String),

    #[error("value `{0}` does not hold the requested type")]
    TypeMismatch(String),

    #[error(transparent)]
    Upstream(#[from] Failure),
}

/// Raised by a fallible combination when its inputs cannot be interpolated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FormatError(String);

impl FormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}
