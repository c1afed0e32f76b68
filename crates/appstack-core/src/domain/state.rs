//! State - 値ノードの決着状態
//!
//! # 状態遷移
//! - pending: 外部システムの結果待ち
//! - resolved: 値が確定（以後読み取り専用）
//! - failed: 上流の失敗、またはフォーマット失敗
//!
//! pending からの遷移は一度だけ。resolved / failed は終端状態。

use serde::{Deserialize, Serialize};

/// Why a value could not be produced.
///
/// The same failure is cloned into every node that depends on the one that
/// failed first, so `origin` always names the original failing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    #[error("upstream `{origin}` failed: {message}")]
    Upstream { origin: String, message: String },

    #[error("formatting `{origin}` failed: {message}")]
    Format { origin: String, message: String },
}

impl Failure {
    pub fn upstream(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn format(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Format {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn origin(&self) -> &str {
        match self {
            Self::Upstream { origin, .. } | Self::Format { origin, .. } => origin,
        }
    }
}

/// Settlement of a deferred value, borrowed or owned.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement<T> {
    Pending,
    Resolved(T),
    Failed(Failure),
}

impl<T> Settlement<T> {
    pub fn state(&self) -> ValueState {
        match self {
            Self::Pending => ValueState::Pending,
            Self::Resolved(_) => ValueState::Resolved,
            Self::Failed(_) => ValueState::Failed,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_borrowed(&self) -> Settlement<&T> {
        match self {
            Self::Pending => Settlement::Pending,
            Self::Resolved(v) => Settlement::Resolved(v),
            Self::Failed(f) => Settlement::Failed(f.clone()),
        }
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            Self::Resolved(v) => Some(v),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(f) => Some(f),
            _ => None,
        }
    }
}

/// Type-erased view of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueState {
    Pending,
    Resolved,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_keeps_origin() {
        let f = Failure::upstream("appservice-sql", "quota exceeded");
        assert_eq!(f.origin(), "appservice-sql");
        assert_eq!(f.to_string(), "upstream `appservice-sql` failed: quota exceeded");
    }

    #[test]
    fn settlement_reports_state() {
        let pending: Settlement<String> = Settlement::Pending;
        let resolved = Settlement::Resolved("x".to_string());
        let failed: Settlement<String> = Settlement::Failed(Failure::format("url", "empty"));

        assert_eq!(pending.state(), ValueState::Pending);
        assert!(!pending.is_settled());
        assert_eq!(resolved.state(), ValueState::Resolved);
        assert_eq!(resolved.as_borrowed().resolved().map(String::as_str), Some("x"));
        assert_eq!(failed.state(), ValueState::Failed);
        assert_eq!(failed.failure().map(Failure::origin), Some("url"));
    }

    #[test]
    fn failure_is_tagged_in_json() {
        let v = serde_json::to_value(Failure::upstream("rg", "boom")).unwrap();
        assert_eq!(v["kind"], "upstream");
        assert_eq!(v["origin"], "rg");
    }
}
