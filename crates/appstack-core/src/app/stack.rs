//! Stack - リソース宣言と実行ステップの集合
//!
//! # 構成
//! - **Composer**: すべての deferred 値の持ち主
//! - **Step**: engine への一回の呼び出し（リソース作成 / SAS 署名）
//! - **exports**: デプロイ後に外へ出す名前付きの値
//!
//! 宣言した時点では何も実行されません。`Deployment` がステップを順に
//! engine へ渡し、返ってきた出力で pending の値を resolve します。

use std::collections::BTreeMap;
use std::fmt;

use crate::deferred::{Composer, Deferred, Input};
use crate::domain::{ResourceKind, SasRequest, StepId, ValueId};

/// A resource as declared, before any of its inputs are known.
#[derive(Debug, Clone)]
pub struct ResourceDeclaration {
    pub name: String,
    pub kind: ResourceKind,
    pub properties: BTreeMap<String, Input>,
}

impl ResourceDeclaration {
    /// Every deferred value referenced by the properties.
    pub fn dependencies(&self) -> Vec<ValueId> {
        let mut ids: Vec<ValueId> = self.properties.values().flat_map(Input::dependencies).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Outputs a declared resource will report once created.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    name: String,
    kind: ResourceKind,
    outputs: BTreeMap<&'static str, Deferred<String>>,
    id: Deferred<String>,
    physical_name: Deferred<String>,
}

impl ResourceHandle {
    pub fn logical_name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> Deferred<String> {
        self.id
    }

    /// The physical name reported by the engine.
    pub fn name(&self) -> Deferred<String> {
        self.physical_name
    }

    pub fn output(&self, key: &str) -> Option<Deferred<String>> {
        self.outputs.get(key).copied()
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&'static str, Deferred<String>)> + '_ {
        self.outputs.iter().map(|(k, v)| (*k, *v))
    }
}

#[derive(Debug, Clone)]
pub enum StepKind {
    Create {
        declaration: ResourceDeclaration,
        handle: ResourceHandle,
    },
    SignSas {
        request: Deferred<SasRequest>,
        token: Deferred<String>,
    },
}

/// One call into the provisioning engine.
#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,
    pub label: String,
    pub kind: StepKind,
}

impl Step {
    /// Values that must settle before the step can run.
    pub fn inputs(&self) -> Vec<ValueId> {
        match &self.kind {
            StepKind::Create { declaration, .. } => declaration.dependencies(),
            StepKind::SignSas { request, .. } => vec![request.id()],
        }
    }

    /// Values the step settles.
    pub fn outputs(&self) -> Vec<ValueId> {
        match &self.kind {
            StepKind::Create { handle, .. } => handle.outputs().map(|(_, d)| d.id()).collect(),
            StepKind::SignSas { token, .. } => vec![token.id()],
        }
    }

    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match &self.kind {
            StepKind::Create { declaration, .. } => Some(declaration.kind),
            StepKind::SignSas { .. } => None,
        }
    }
}

/// A declared topology: its values, its steps, and its exports.
pub struct Stack {
    composer: Composer,
    steps: Vec<Step>,
    exports: BTreeMap<String, Deferred<String>>,
}

impl Stack {
    pub fn new() -> Self {
        Self {
            composer: Composer::new(),
            steps: Vec::new(),
            exports: BTreeMap::new(),
        }
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    /// Declare a resource. One pending value is created per output key of
    /// `kind`, labelled `{name}.{key}`.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        kind: ResourceKind,
        properties: BTreeMap<String, Input>,
    ) -> ResourceHandle {
        let name = name.into();
        let id = self.composer.pending::<String>(format!("{name}.id"));
        let physical_name = self.composer.pending::<String>(format!("{name}.name"));
        let mut outputs = BTreeMap::from([("id", id), ("name", physical_name)]);
        for key in kind.output_keys() {
            if !outputs.contains_key(key) {
                let value = self.composer.pending::<String>(format!("{name}.{key}"));
                outputs.insert(*key, value);
            }
        }

        let handle = ResourceHandle {
            name: name.clone(),
            kind,
            outputs,
            id,
            physical_name,
        };
        self.steps.push(Step {
            id: StepId::generate(),
            label: name.clone(),
            kind: StepKind::Create {
                declaration: ResourceDeclaration {
                    name,
                    kind,
                    properties,
                },
                handle: handle.clone(),
            },
        });
        handle
    }

    /// Ask the engine to sign `request` once it resolves; returns the token.
    pub fn sign_sas(&mut self, label: impl Into<String>, request: Deferred<SasRequest>) -> Deferred<String> {
        let label = label.into();
        let token = self.composer.pending::<String>(format!("{label}.token"));
        self.steps.push(Step {
            id: StepId::generate(),
            label,
            kind: StepKind::SignSas { request, token },
        });
        token
    }

    pub fn export(&mut self, name: impl Into<String>, value: Deferred<String>) {
        self.exports.insert(name.into(), value);
    }

    pub fn exports(&self) -> &BTreeMap<String, Deferred<String>> {
        &self.exports
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn declarations(&self) -> impl Iterator<Item = &ResourceDeclaration> {
        self.steps.iter().filter_map(|s| match &s.kind {
            StepKind::Create { declaration, .. } => Some(declaration),
            StepKind::SignSas { .. } => None,
        })
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceHandle> {
        self.steps.iter().find_map(|s| match &s.kind {
            StepKind::Create { handle, .. } if handle.name == name => Some(handle),
            _ => None,
        })
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("steps", &self.steps.len())
            .field("exports", &self.exports.keys().collect::<Vec<_>>())
            .field("composer", &self.composer)
            .finish()
    }
}

/// `BTreeMap<String, Input>` from `(key, input)` pairs.
pub fn properties<K, V, I>(entries: I) -> BTreeMap<String, Input>
where
    K: Into<String>,
    V: Into<Input>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ValidityWindow;

    #[test]
    fn declare_creates_one_pending_value_per_output_key() {
        let mut stack = Stack::new();
        let rg = stack.declare(
            "rg",
            ResourceKind::ResourceGroup,
            properties([("location", "westus2")]),
        );

        let keys: Vec<_> = rg.outputs().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["id", "location", "name"]);
        assert_eq!(stack.composer().pending_count(), 3);
        assert_eq!(stack.composer().label(rg.name().id()), Some("rg.name"));
        assert_eq!(stack.steps().len(), 1);
    }

    #[test]
    fn step_inputs_follow_property_references() {
        let mut stack = Stack::new();
        let rg = stack.declare("rg", ResourceKind::ResourceGroup, properties([("location", "westus2")]));
        let sa = stack.declare(
            "sa",
            ResourceKind::StorageAccount,
            properties([
                ("resourceGroupName", Input::from(rg.name())),
                ("kind", Input::from("StorageV2")),
                ("tags", Input::object([("rg", rg.name())])),
            ]),
        );

        assert!(stack.steps()[0].inputs().is_empty());
        assert_eq!(stack.steps()[1].inputs(), vec![rg.name().id()]);
        assert_eq!(stack.steps()[1].outputs().len(), 2);
        assert_eq!(stack.resource("sa").map(ResourceHandle::id), Some(sa.id()));
    }

    #[test]
    fn sign_sas_waits_on_the_request() {
        let mut stack = Stack::new();
        let request = stack.composer_mut().pending::<SasRequest>("sas.request");
        let token = stack.sign_sas("sas", request);

        let step = &stack.steps()[0];
        assert_eq!(step.inputs(), vec![request.id()]);
        assert_eq!(step.outputs(), vec![token.id()]);
        assert_eq!(step.resource_kind(), None);
        assert_eq!(stack.declarations().count(), 0);

        stack
            .composer_mut()
            .resolve(&request, SasRequest::for_blob("a", "c", "b", "rg", ValidityWindow::default()))
            .unwrap();
        assert!(!stack.composer().is_settled(token.id()));
    }
}
