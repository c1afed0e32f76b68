//! Resource kinds and the rendered request/response shapes exchanged with a
//! provisioning engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The resource types this topology declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroup,
    StorageAccount,
    BlobContainer,
    Blob,
    AppServicePlan,
    WebApp,
    InsightsComponent,
    SqlServer,
    SqlDatabase,
}

impl ResourceKind {
    /// Provider type token, e.g. `azure:storage:StorageAccount`.
    pub fn type_token(&self) -> &'static str {
        match self {
            Self::ResourceGroup => "azure:resources:ResourceGroup",
            Self::StorageAccount => "azure:storage:StorageAccount",
            Self::BlobContainer => "azure:storage:BlobContainer",
            Self::Blob => "azure:storage:Blob",
            Self::AppServicePlan => "azure:web:AppServicePlan",
            Self::WebApp => "azure:web:WebApp",
            Self::InsightsComponent => "azure:insights:Component",
            Self::SqlServer => "azure:sql:Server",
            Self::SqlDatabase => "azure:sql:Database",
        }
    }

    /// ARM resource type used when building resource ids.
    pub fn arm_type(&self) -> &'static str {
        match self {
            Self::ResourceGroup => "resourceGroups",
            Self::StorageAccount => "Microsoft.Storage/storageAccounts",
            Self::BlobContainer => "Microsoft.Storage/storageAccounts/blobServices/containers",
            Self::Blob => "Microsoft.Storage/storageAccounts/blobServices/containers/blobs",
            Self::AppServicePlan => "Microsoft.Web/serverfarms",
            Self::WebApp => "Microsoft.Web/sites",
            Self::InsightsComponent => "Microsoft.Insights/components",
            Self::SqlServer => "Microsoft.Sql/servers",
            Self::SqlDatabase => "Microsoft.Sql/servers/databases",
        }
    }

    /// Property that carries the physical name of the resource.
    pub fn name_property(&self) -> &'static str {
        match self {
            Self::ResourceGroup => "resourceGroupName",
            Self::StorageAccount => "accountName",
            Self::BlobContainer => "containerName",
            Self::Blob => "blobName",
            Self::AppServicePlan | Self::WebApp => "name",
            Self::InsightsComponent => "resourceName",
            Self::SqlServer => "serverName",
            Self::SqlDatabase => "databaseName",
        }
    }

    /// Output keys an engine reports for this kind. `id` and `name` always.
    pub fn output_keys(&self) -> &'static [&'static str] {
        match self {
            Self::ResourceGroup => &["id", "name", "location"],
            Self::InsightsComponent => &["id", "name", "instrumentationKey"],
            Self::WebApp => &["id", "name", "defaultHostName"],
            _ => &["id", "name"],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_token())
    }
}

/// A resource declaration with every input resolved, ready for an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub name: String,
    pub kind: ResourceKind,
    pub properties: serde_json::Value,
}

impl ResourceRequest {
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(serde_json::Value::as_str)
    }

    /// Physical name, falling back to the logical name.
    pub fn physical_name(&self) -> &str {
        self.property_str(self.kind.name_property())
            .unwrap_or(&self.name)
    }
}

/// What an engine reports back after creating a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub id: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl ProvisionedResource {
    /// Output value as a string. Non-string JSON is rendered compactly.
    pub fn output(&self, key: &str) -> Option<String> {
        if key == "id" {
            return Some(self.id.clone());
        }
        self.outputs.get(key).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_kind_reports_id_and_name() {
        for kind in [
            ResourceKind::ResourceGroup,
            ResourceKind::StorageAccount,
            ResourceKind::BlobContainer,
            ResourceKind::Blob,
            ResourceKind::AppServicePlan,
            ResourceKind::WebApp,
            ResourceKind::InsightsComponent,
            ResourceKind::SqlServer,
            ResourceKind::SqlDatabase,
        ] {
            assert!(kind.output_keys().contains(&"id"), "{kind}");
            assert!(kind.output_keys().contains(&"name"), "{kind}");
        }
    }

    #[test]
    fn physical_name_prefers_name_property() {
        let req = ResourceRequest {
            name: "appservice-sql".into(),
            kind: ResourceKind::SqlServer,
            properties: json!({ "serverName": "sql-prod" }),
        };
        assert_eq!(req.physical_name(), "sql-prod");

        let req = ResourceRequest {
            name: "appservice-sql".into(),
            kind: ResourceKind::SqlServer,
            properties: json!({}),
        };
        assert_eq!(req.physical_name(), "appservice-sql");
    }

    #[test]
    fn provisioned_output_renders_strings_and_json() {
        let mut outputs = BTreeMap::new();
        outputs.insert("name".to_string(), json!("rg"));
        outputs.insert("count".to_string(), json!(3));
        let p = ProvisionedResource {
            id: "/subscriptions/x".into(),
            outputs,
        };
        assert_eq!(p.output("id").as_deref(), Some("/subscriptions/x"));
        assert_eq!(p.output("name").as_deref(), Some("rg"));
        assert_eq!(p.output("count").as_deref(), Some("3"));
        assert_eq!(p.output("missing"), None);
    }
}
