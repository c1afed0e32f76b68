//! Report - デプロイ結果の集計
//!
//! ステップごとの結果と、export の成否を持ちます。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Failure, ResourceKind, StepId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    /// The engine was called and returned an error.
    Failed { error: String },
    /// An input failed upstream; the engine was never called.
    Skipped { failure: Failure },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: StepId,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentReport {
    pub steps: Vec<StepRecord>,
    pub exports: BTreeMap<String, String>,
    pub failed_exports: BTreeMap<String, Failure>,
}

impl DeploymentReport {
    pub fn is_success(&self) -> bool {
        self.failed_exports.is_empty() && self.steps.iter().all(|s| s.status == StepStatus::Succeeded)
    }

    pub fn step(&self, label: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.label == label)
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, StepStatus::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, StepStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, StepStatus::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&StepStatus) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(&s.status)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(label: &str, status: StepStatus) -> StepRecord {
        StepRecord {
            step: StepId::generate(),
            label: label.to_string(),
            kind: Some(ResourceKind::SqlServer),
            resource_id: None,
            status,
        }
    }

    #[test]
    fn empty_report_is_success() {
        assert!(DeploymentReport::default().is_success());
    }

    #[test]
    fn any_skipped_step_fails_the_report() {
        let report = DeploymentReport {
            steps: vec![
                record("a", StepStatus::Succeeded),
                record(
                    "b",
                    StepStatus::Skipped {
                        failure: Failure::upstream("a", "boom"),
                    },
                ),
            ],
            ..DeploymentReport::default()
        };

        assert!(!report.is_success());
        assert_eq!((report.succeeded(), report.failed(), report.skipped()), (1, 0, 1));
        assert!(report.step("b").is_some());
    }

    #[test]
    fn status_is_flattened_into_the_record() {
        let value = serde_json::to_value(record("sql", StepStatus::Failed { error: "quota".into() })).unwrap();

        assert_eq!(value["status"], json!("failed"));
        assert_eq!(value["error"], json!("quota"));
        assert_eq!(value["kind"], json!("sql_server"));
        assert!(value.get("resource_id").is_none());
    }
}
