//! Preview - 宣言された構成を JSON で表示する
//!
//! 未確定の値は `"<computed>"`、secret は `"[secret]"` になります。
//! engine には何も送りません。

use serde_json::{Value as Json, json};

use super::stack::{Stack, StepKind};
use crate::deferred::input::COMPUTED;
use crate::deferred::{Input, RenderError, RenderMode};

/// Render the stack's resources, sign requests and exports.
pub fn preview(stack: &Stack) -> Result<Json, RenderError> {
    let composer = stack.composer();
    let mut resources = Vec::new();
    let mut signatures = Vec::new();

    for step in stack.steps() {
        match &step.kind {
            StepKind::Create { declaration, .. } => {
                let properties = declaration
                    .properties
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.render(composer, RenderMode::Preview)?)))
                    .collect::<Result<serde_json::Map<String, Json>, RenderError>>()?;
                resources.push(json!({
                    "name": declaration.name,
                    "type": declaration.kind.type_token(),
                    "properties": properties,
                }));
            }
            StepKind::SignSas { request, .. } => {
                let request = match composer.value(request) {
                    Some(r) => serde_json::to_value(r).unwrap_or(Json::Null),
                    None => Json::from(COMPUTED),
                };
                signatures.push(json!({ "name": step.label, "request": request }));
            }
        }
    }

    let exports = stack
        .exports()
        .iter()
        .map(|(name, value)| Ok((name.clone(), Input::from(value).render(composer, RenderMode::Preview)?)))
        .collect::<Result<serde_json::Map<String, Json>, RenderError>>()?;

    Ok(json!({
        "resources": resources,
        "signatures": signatures,
        "exports": exports,
    }))
}
