//! ProvisioningEngine port - 外部のプロビジョニングエンジン
//!
//! engine はブラックボックスです。リソース作成と SAS 署名の二つだけを要求します。
//!
//! # 設計原則
//! - 入力はすべて resolved 済み（`ResourceRequest` は JSON のみを持つ）
//! - リトライは engine 側の責務。このレイヤーでは再試行しない
//! - 複数の呼び出しが同時に走ってもよい（`Send + Sync`）

use async_trait::async_trait;

use crate::domain::{ProvisionedResource, ResourceRequest, SasRequest};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine rejected `{resource}`: {reason}")]
    Rejected { resource: String, reason: String },

    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Create (or update) one resource and report its outputs.
    async fn create(&self, request: &ResourceRequest) -> Result<ProvisionedResource, EngineError>;

    /// Compute a service SAS token for a storage resource.
    async fn service_sas(&self, request: &SasRequest) -> Result<String, EngineError>;
}
