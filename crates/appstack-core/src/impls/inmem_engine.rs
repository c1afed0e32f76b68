//! InMemoryEngine - 開発用・テスト用のプロビジョニングエンジン
//!
//! # 実装詳細
//! - 作成要求と署名要求を記録するだけで、外部には何も送らない
//! - 出力値（id, instrumentationKey, defaultHostName など）は名前から決定的に生成
//! - `with_failure` で任意のリソース（または SAS 署名）を失敗させられる

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::{ProvisionedResource, ResourceKind, ResourceRequest, SasRequest};
use crate::ports::{Clock, EngineError, ProvisioningEngine, SystemClock};

/// Name under which SAS sign requests are recorded and can be failed.
pub const SAS_OPERATION: &str = "storage:listStorageAccountServiceSAS";

const SAS_VERSION: &str = "2015-04-05";

#[derive(Default)]
struct EngineState {
    created: Vec<ResourceRequest>,
    signed: Vec<SasRequest>,
}

pub struct InMemoryEngine<C = SystemClock> {
    clock: C,
    subscription: String,
    failures: HashMap<String, String>,
    state: Arc<Mutex<EngineState>>,
}

impl InMemoryEngine<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryEngine<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryEngine<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            subscription: "00000000-0000-0000-0000-000000000000".to_string(),
            failures: HashMap::new(),
            state: Arc::new(Mutex::new(EngineState::default())),
        }
    }

    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = subscription.into();
        self
    }

    /// Make every request for `name` (a logical resource name, or
    /// [`SAS_OPERATION`]) fail with `reason`.
    pub fn with_failure(mut self, name: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures.insert(name.into(), reason.into());
        self
    }

    /// Resource requests received so far, in arrival order.
    pub async fn created(&self) -> Vec<ResourceRequest> {
        self.state.lock().await.created.clone()
    }

    /// Sign requests received so far, in arrival order.
    pub async fn signed(&self) -> Vec<SasRequest> {
        self.state.lock().await.signed.clone()
    }

    fn check_failure(&self, name: &str) -> Result<(), EngineError> {
        match self.failures.get(name) {
            Some(reason) => Err(EngineError::Rejected {
                resource: name.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn resource_id(&self, request: &ResourceRequest) -> String {
        let name = request.physical_name();
        match request.kind {
            ResourceKind::ResourceGroup => {
                format!("/subscriptions/{}/resourceGroups/{}", self.subscription, name)
            }
            kind => format!(
                "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
                self.subscription,
                request.property_str("resourceGroupName").unwrap_or_default(),
                kind.arm_type(),
                name
            ),
        }
    }
}

#[async_trait]
impl<C: Clock> ProvisioningEngine for InMemoryEngine<C> {
    async fn create(&self, request: &ResourceRequest) -> Result<ProvisionedResource, EngineError> {
        self.check_failure(&request.name)?;

        let name = request.physical_name().to_string();
        let id = self.resource_id(request);
        let mut outputs = BTreeMap::new();
        outputs.insert("name".to_string(), json!(name));

        match request.kind {
            ResourceKind::ResourceGroup => {
                let location = request.property_str("location").ok_or_else(|| EngineError::Rejected {
                    resource: request.name.clone(),
                    reason: "location is required".to_string(),
                })?;
                outputs.insert("location".to_string(), json!(location));
            }
            ResourceKind::InsightsComponent => {
                outputs.insert("instrumentationKey".to_string(), json!(instrumentation_key(&id)));
            }
            ResourceKind::WebApp => {
                outputs.insert(
                    "defaultHostName".to_string(),
                    json!(format!("{name}.azurewebsites.net")),
                );
            }
            _ => {}
        }

        info!(resource = %request.name, kind = %request.kind, %id, "created");
        self.state.lock().await.created.push(request.clone());
        Ok(ProvisionedResource { id, outputs })
    }

    async fn service_sas(&self, request: &SasRequest) -> Result<String, EngineError> {
        self.check_failure(SAS_OPERATION)?;

        let today = self.clock.now().date_naive();
        if !request.window.contains(today) {
            return Err(EngineError::Rejected {
                resource: request.canonicalized_resource.clone(),
                reason: format!(
                    "validity window {}..{} does not cover {}",
                    request.window.start(),
                    request.window.expiry(),
                    today
                ),
            });
        }

        let token = format!(
            "sv={}&sr={}&st={}&se={}&sp={}&spr={}&sig={}",
            SAS_VERSION,
            request.resource.as_str(),
            request.window.start(),
            request.window.expiry(),
            request.permissions.letters(),
            request.protocol.as_str(),
            signature(request),
        );
        info!(resource = %request.canonicalized_resource, "signed");
        self.state.lock().await.signed.push(request.clone());
        Ok(token)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn signature(request: &SasRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.canonicalized_resource.as_bytes());
    hasher.update(request.window.start().to_string().as_bytes());
    hasher.update(request.window.expiry().to_string().as_bytes());
    hasher.update(request.permissions.letters().as_bytes());
    hex(&hasher.finalize()[..16])
}

/// GUID-shaped key derived from the resource id.
fn instrumentation_key(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let h = hex(&digest[..16]);
    format!("{}-{}-{}-{}-{}", &h[0..8], &h[8..12], &h[12..16], &h[16..20], &h[20..32])
}
