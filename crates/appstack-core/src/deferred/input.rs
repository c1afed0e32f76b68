//! Input - リソースプロパティの入力値
//!
//! プロパティは literal / deferred / secret をネストして持てます。
//! engine に渡す前に、含まれる deferred がすべて resolved である必要があります。

use std::collections::BTreeMap;

use serde_json::Value as Json;

use super::composer::{Composer, Deferred};
use crate::domain::{Failure, Settlement, ValueId};

/// Placeholder for values that are not known yet.
pub const COMPUTED: &str = "<computed>";

/// Placeholder for secret values.
pub const MASKED: &str = "[secret]";

/// Placeholder for values whose upstream failed.
pub const FAILED: &str = "<failed>";

/// A property value in a resource declaration.
#[derive(Debug, Clone)]
pub enum Input {
    Literal(Json),
    Output(Deferred<String>),
    Secret(Box<Input>),
    Object(BTreeMap<String, Input>),
    List(Vec<Input>),
}

/// How to render deferred and secret parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Every deferred must be resolved; secrets are emitted in plaintext.
    Engine,
    /// Unknowns become placeholders; secrets are masked.
    Preview,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("input `{0}` is still pending")]
    Unresolved(String),

    #[error(transparent)]
    Failed(#[from] Failure),
}

impl Input {
    pub fn secret(inner: impl Into<Input>) -> Self {
        Self::Secret(Box::new(inner.into()))
    }

    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Input>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Input>,
        I: IntoIterator<Item = V>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Every deferred value this input references, depth first.
    pub fn dependencies(&self) -> Vec<ValueId> {
        let mut out = Vec::new();
        self.collect_dependencies(&mut out);
        out
    }

    fn collect_dependencies(&self, out: &mut Vec<ValueId>) {
        match self {
            Self::Literal(_) => {}
            Self::Output(d) => out.push(d.id()),
            Self::Secret(inner) => inner.collect_dependencies(out),
            Self::Object(map) => map.values().for_each(|v| v.collect_dependencies(out)),
            Self::List(items) => items.iter().for_each(|v| v.collect_dependencies(out)),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Secret(_))
    }

    pub fn render(&self, composer: &Composer, mode: RenderMode) -> Result<Json, RenderError> {
        match self {
            Self::Literal(v) => Ok(v.clone()),
            Self::Output(d) => match composer.settlement(d) {
                Ok(Settlement::Resolved(v)) => Ok(Json::String(v.clone())),
                Ok(Settlement::Pending) if mode == RenderMode::Preview => Ok(Json::from(COMPUTED)),
                Ok(Settlement::Failed(_)) if mode == RenderMode::Preview => Ok(Json::from(FAILED)),
                Ok(Settlement::Failed(f)) => Err(RenderError::Failed(f)),
                Ok(Settlement::Pending) | Err(_) => Err(RenderError::Unresolved(
                    composer.label(d.id()).unwrap_or_default().to_string(),
                )),
            },
            Self::Secret(_) if mode == RenderMode::Preview => Ok(Json::from(MASKED)),
            Self::Secret(inner) => inner.render(composer, mode),
            Self::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), v.render(composer, mode)?)))
                .collect::<Result<serde_json::Map<String, Json>, RenderError>>()
                .map(Json::Object),
            Self::List(items) => items
                .iter()
                .map(|v| v.render(composer, mode))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
        }
    }
}

impl From<Json> for Input {
    fn from(v: Json) -> Self {
        Self::Literal(v)
    }
}

impl From<&str> for Input {
    fn from(v: &str) -> Self {
        Self::Literal(Json::from(v))
    }
}

impl From<String> for Input {
    fn from(v: String) -> Self {
        Self::Literal(Json::from(v))
    }
}

impl From<Deferred<String>> for Input {
    fn from(d: Deferred<String>) -> Self {
        Self::Output(d)
    }
}

impl From<&Deferred<String>> for Input {
    fn from(d: &Deferred<String>) -> Self {
        Self::Output(*d)
    }
}
