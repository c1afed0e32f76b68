//! Deployment - ステップを engine に渡し、結果を composer に戻す
//!
//! # ラウンド
//! 1. 未実行のステップを入力の状態で分類する
//!    - 入力に failed がある → skip（出力を同じ failure で fail、engine は呼ばない）
//!    - 入力がすべて resolved → ready
//!    - それ以外 → 次のラウンドへ
//! 2. ready なステップを engine に同時に投げる（`join_all`）
//! 3. 結果を driving task 上で composer に反映する（resolve / fail）
//!
//! composer を触るのは常にこのタスクだけです。engine 呼び出しだけが並行に走ります。

use std::collections::BTreeSet;

use futures::future::{BoxFuture, FutureExt, join_all};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use super::report::{DeploymentReport, StepRecord, StepStatus};
use super::stack::{Stack, Step, StepKind};
use crate::config::ConfigError;
use crate::deferred::{Deferred, RenderError, RenderMode};
use crate::domain::{
    ComposeError, Failure, ProvisionedResource, ResourceRequest, SasRequest, Settlement, ValueState,
};
use crate::ports::{EngineError, ProvisioningEngine};

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("deployment stalled; waiting steps: {0:?}")]
    Stalled(Vec<String>),
}

enum Call {
    Create(ResourceRequest),
    Sign(SasRequest),
}

enum Response {
    Created(ProvisionedResource),
    Signed(String),
}

pub struct Deployment<E> {
    stack: Stack,
    engine: E,
    done: BTreeSet<usize>,
    records: Vec<StepRecord>,
}

impl<E: ProvisioningEngine> Deployment<E> {
    pub fn new(stack: Stack, engine: E) -> Self {
        Self {
            stack,
            engine,
            done: BTreeSet::new(),
            records: Vec::new(),
        }
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run every remaining step and report the outcome.
    ///
    /// Engine failures do not make this return `Err`; they show up in the
    /// report. `Err` means the stack itself is inconsistent.
    pub async fn run(&mut self) -> Result<DeploymentReport, DeployError> {
        let mut round = 0usize;
        loop {
            let remaining: Vec<usize> = (0..self.stack.steps().len())
                .filter(|i| !self.done.contains(i))
                .collect();
            if remaining.is_empty() {
                break;
            }
            round += 1;

            let mut ready = Vec::new();
            let mut progressed = false;
            for index in remaining {
                match self.classify(index) {
                    Readiness::Waiting => {}
                    Readiness::Ready => ready.push(index),
                    Readiness::Blocked(failure) => {
                        self.skip(index, failure)?;
                        progressed = true;
                    }
                }
            }

            if ready.is_empty() {
                if progressed {
                    continue;
                }
                let waiting = self
                    .stack
                    .steps()
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !self.done.contains(i))
                    .map(|(_, s)| s.label.clone())
                    .collect();
                return Err(DeployError::Stalled(waiting));
            }

            debug!(round, steps = ready.len(), "submitting ready steps");
            let mut calls = Vec::with_capacity(ready.len());
            for index in ready {
                match self.prepare(index) {
                    Ok(call) => calls.push((index, call)),
                    Err(failure) => self.skip(index, failure)?,
                }
            }

            let engine = &self.engine;
            let futures: Vec<BoxFuture<'_, (usize, Result<Response, EngineError>)>> = calls
                .iter()
                .map(|(index, call)| {
                    let index = *index;
                    async move {
                        let result = match call {
                            Call::Create(request) => engine.create(request).await.map(Response::Created),
                            Call::Sign(request) => engine.service_sas(request).await.map(Response::Signed),
                        };
                        (index, result)
                    }
                    .boxed()
                })
                .collect();
            let results = join_all(futures).await;

            for (index, result) in results {
                self.complete(index, result)?;
            }
        }

        Ok(self.report())
    }

    fn classify(&self, index: usize) -> Readiness {
        let composer = self.stack.composer();
        let mut all_resolved = true;
        for input in self.stack.steps()[index].inputs() {
            match composer.state(input) {
                Some(ValueState::Resolved) => {}
                Some(ValueState::Failed) => {
                    let failure = composer
                        .failure(input)
                        .cloned()
                        .unwrap_or_else(|| Failure::upstream(composer.label(input).unwrap_or_default(), "failed"));
                    return Readiness::Blocked(failure);
                }
                Some(ValueState::Pending) => all_resolved = false,
                None => {
                    return Readiness::Blocked(Failure::format(
                        &self.stack.steps()[index].label,
                        format!("input {input} is not part of this stack"),
                    ));
                }
            }
        }
        if all_resolved { Readiness::Ready } else { Readiness::Waiting }
    }

    /// Render the engine call for a step whose inputs all resolved.
    fn prepare(&self, index: usize) -> Result<Call, Failure> {
        let step = &self.stack.steps()[index];
        let composer = self.stack.composer();
        match &step.kind {
            StepKind::Create { declaration, .. } => {
                let properties = declaration
                    .properties
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.render(composer, RenderMode::Engine)?)))
                    .collect::<Result<serde_json::Map<String, Json>, RenderError>>()
                    .map_err(|e| match e {
                        RenderError::Failed(f) => f,
                        RenderError::Unresolved(label) => {
                            Failure::format(&step.label, format!("input `{label}` is still pending"))
                        }
                    })?;
                Ok(Call::Create(ResourceRequest {
                    name: declaration.name.clone(),
                    kind: declaration.kind,
                    properties: Json::Object(properties),
                }))
            }
            StepKind::SignSas { request, .. } => match composer.settlement(request) {
                Ok(Settlement::Resolved(r)) => Ok(Call::Sign(r.clone())),
                Ok(Settlement::Failed(f)) => Err(f),
                Ok(Settlement::Pending) | Err(_) => {
                    Err(Failure::format(&step.label, "sign request is not resolved"))
                }
            },
        }
    }

    fn skip(&mut self, index: usize, failure: Failure) -> Result<(), DeployError> {
        let step = self.stack.steps()[index].clone();
        warn!(step = %step.label, error = %failure, "skipped");
        self.fail_outputs(&step, &failure)?;
        self.record(index, &step, None, StepStatus::Skipped { failure });
        Ok(())
    }

    fn complete(&mut self, index: usize, result: Result<Response, EngineError>) -> Result<(), DeployError> {
        let step = self.stack.steps()[index].clone();
        match (result, &step.kind) {
            (Ok(Response::Created(provisioned)), StepKind::Create { handle, .. }) => {
                info!(step = %step.label, id = %provisioned.id, "provisioned");
                for (key, value) in handle.outputs() {
                    self.settle_output(&step, key, value, &provisioned)?;
                }
                self.record(index, &step, Some(provisioned.id), StepStatus::Succeeded);
            }
            (Ok(Response::Signed(token)), StepKind::SignSas { token: slot, .. }) => {
                info!(step = %step.label, "signed");
                self.stack.composer_mut().resolve(slot, token)?;
                self.record(index, &step, None, StepStatus::Succeeded);
            }
            (Ok(_), _) => {
                let failure = Failure::format(&step.label, "engine answered with the wrong kind of response");
                self.fail_outputs(&step, &failure)?;
                self.record(index, &step, None, StepStatus::Failed { error: failure.to_string() });
            }
            (Err(err), _) => {
                warn!(step = %step.label, error = %err, "engine call failed");
                let failure = Failure::upstream(&step.label, err.to_string());
                self.fail_outputs(&step, &failure)?;
                self.record(index, &step, None, StepStatus::Failed { error: err.to_string() });
            }
        }
        Ok(())
    }

    fn settle_output(
        &mut self,
        step: &Step,
        key: &str,
        value: Deferred<String>,
        provisioned: &ProvisionedResource,
    ) -> Result<(), DeployError> {
        let composer = self.stack.composer_mut();
        match provisioned.output(key) {
            Some(v) => composer.resolve(&value, v)?,
            None => {
                warn!(step = %step.label, key, "engine reported no such output");
                composer.fail(
                    &value,
                    Failure::upstream(&step.label, format!("engine reported no `{key}` output")),
                )?;
            }
        }
        Ok(())
    }

    fn fail_outputs(&mut self, step: &Step, failure: &Failure) -> Result<(), DeployError> {
        let composer = self.stack.composer_mut();
        for id in step.outputs() {
            if composer.is_settled(id) {
                continue;
            }
            match &step.kind {
                StepKind::Create { handle, .. } => {
                    if let Some((_, value)) = handle.outputs().find(|(_, d)| d.id() == id) {
                        composer.fail(&value, failure.clone())?;
                    }
                }
                StepKind::SignSas { token, .. } => composer.fail(token, failure.clone())?,
            }
        }
        Ok(())
    }

    fn record(&mut self, index: usize, step: &Step, resource_id: Option<String>, status: StepStatus) {
        self.done.insert(index);
        self.records.push(StepRecord {
            step: step.id,
            label: step.label.clone(),
            kind: step.resource_kind(),
            resource_id,
            status,
        });
    }

    fn report(&self) -> DeploymentReport {
        let composer = self.stack.composer();
        let mut report = DeploymentReport {
            steps: self.records.clone(),
            ..DeploymentReport::default()
        };
        for (name, value) in self.stack.exports() {
            match composer.settlement(value) {
                Ok(Settlement::Resolved(v)) => {
                    report.exports.insert(name.clone(), v.clone());
                }
                Ok(Settlement::Failed(f)) => {
                    report.failed_exports.insert(name.clone(), f);
                }
                Ok(Settlement::Pending) | Err(_) => {
                    report
                        .failed_exports
                        .insert(name.clone(), Failure::format(name, "export never resolved"));
                }
            }
        }
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            exports = report.exports.len(),
            "deployment finished"
        );
        report
    }
}

enum Readiness {
    Ready,
    Waiting,
    Blocked(Failure),
}
