//! Topology - App Service + Storage + Insights + SQL のデプロイ構成
//!
//! # 合成される値
//! - **signed blob URL**: account / container / blob / resource group の名前から
//!   SAS 要求を組み立て、engine の署名トークンと合わせて URL にする
//! - **DB 接続文字列**: server / database の名前とログイン情報から作る（secret）
//! - **Insights 接続文字列**: instrumentation key から作る
//! - **endpoint**: web app の default host name から作る（唯一の export）

use tracing::debug;

use super::stack::{ResourceHandle, Stack, properties};
use crate::config::StackConfig;
use crate::deferred::{Deferred, Input};
use crate::domain::format;
use crate::domain::{ConnectionDescriptor, FormatError, ResourceKind, SasRequest};

pub const RESOURCE_GROUP: &str = "appservicerg";
pub const STORAGE_ACCOUNT: &str = "appservicesa";
pub const APP_SERVICE_PLAN: &str = "appservice-asp";
pub const BLOB_CONTAINER: &str = "appservice-c";
pub const BLOB: &str = "appservice-b";
pub const INSIGHTS: &str = "appservice-ai";
pub const SQL_SERVER: &str = "appservice-sql";
pub const SQL_DATABASE: &str = "appservice-db";
pub const WEB_APP: &str = "appservice-as";
pub const BLOB_SAS: &str = "appservice-b-sas";

pub const ENDPOINT_EXPORT: &str = "endpoint";

/// The declared stack plus the composed values worth inspecting.
#[derive(Debug)]
pub struct AppServiceStack {
    pub stack: Stack,
    pub signed_blob_url: Deferred<String>,
    pub db_connection_string: Deferred<String>,
    pub insights_connection_string: Deferred<String>,
    pub endpoint: Deferred<String>,
}

pub fn app_service_stack(config: &StackConfig) -> AppServiceStack {
    let mut stack = Stack::new();

    let rg = stack.declare(
        RESOURCE_GROUP,
        ResourceKind::ResourceGroup,
        properties([
            ("resourceGroupName", Input::from(RESOURCE_GROUP)),
            ("location", Input::from(config.location.as_str())),
        ]),
    );
    let rg_location = output(&rg, "location");

    let account = stack.declare(
        STORAGE_ACCOUNT,
        ResourceKind::StorageAccount,
        properties([
            ("accountName", Input::from(STORAGE_ACCOUNT)),
            ("resourceGroupName", Input::from(rg.name())),
            ("kind", Input::from("StorageV2")),
            ("sku", Input::object([("name", "Standard_LRS")])),
        ]),
    );

    let plan = stack.declare(
        APP_SERVICE_PLAN,
        ResourceKind::AppServicePlan,
        properties([
            ("name", Input::from(APP_SERVICE_PLAN)),
            ("resourceGroupName", Input::from(rg.name())),
            ("kind", Input::from("App")),
            ("sku", Input::object([("tier", "Basic"), ("name", "B1")])),
        ]),
    );

    let container = stack.declare(
        BLOB_CONTAINER,
        ResourceKind::BlobContainer,
        properties([
            ("containerName", Input::from(BLOB_CONTAINER)),
            ("accountName", Input::from(account.name())),
            ("publicAccess", Input::from("None")),
            ("resourceGroupName", Input::from(rg.name())),
        ]),
    );

    let blob = stack.declare(
        BLOB,
        ResourceKind::Blob,
        properties([
            ("blobName", Input::from(BLOB)),
            ("resourceGroupName", Input::from(rg.name())),
            ("accountName", Input::from(account.name())),
            ("containerName", Input::from(container.name())),
            ("type", Input::from("Block")),
            ("source", Input::object([("archive", config.archive_path.as_str())])),
        ]),
    );

    let window = config.sas_window;
    let sas_request = stack.composer_mut().combine(
        format!("{BLOB_SAS}.request"),
        (account.name(), container.name(), blob.name(), rg.name()),
        move |(account, container, blob, rg)| SasRequest::for_blob(account, container, blob, rg, window),
    );
    let sas_token = stack.sign_sas(BLOB_SAS, sas_request);
    let signed_blob_url = stack.composer_mut().combine(
        "signedBlobUrl",
        (sas_request, sas_token),
        |(request, token)| format::signed_blob_url(&request, &token),
    );

    let insights = stack.declare(
        INSIGHTS,
        ResourceKind::InsightsComponent,
        properties([
            ("resourceName", Input::from(INSIGHTS)),
            ("kind", Input::from("web")),
            ("resourceGroupName", Input::from(rg.name())),
            ("location", Input::from(rg_location)),
            ("applicationType", Input::from("web")),
        ]),
    );
    let instrumentation_key = output(&insights, "instrumentationKey");

    let sql_server = stack.declare(
        SQL_SERVER,
        ResourceKind::SqlServer,
        properties([
            ("serverName", Input::from(SQL_SERVER)),
            ("resourceGroupName", Input::from(rg.name())),
            ("location", Input::from(rg_location)),
            ("administratorLogin", Input::from(config.sql_login.as_str())),
            (
                "administratorLoginPassword",
                Input::secret(config.sql_password.expose()),
            ),
            ("version", Input::from("12.0")),
        ]),
    );

    let database = stack.declare(
        SQL_DATABASE,
        ResourceKind::SqlDatabase,
        properties([
            ("databaseName", Input::from(SQL_DATABASE)),
            ("resourceGroupName", Input::from(rg.name())),
            ("location", Input::from(rg_location)),
            ("serverName", Input::from(sql_server.name())),
            ("requestedServiceObjectiveName", Input::from("S0")),
        ]),
    );

    let composer = stack.composer_mut();
    let login = composer.known("sqlLogin", config.sql_login.clone());
    let password = composer.known("sqlPassword", config.sql_password.clone());
    let db_connection_string = composer.combine(
        "dbConnectionString",
        (sql_server.name(), database.name(), login, password),
        |(server, database, login, password)| {
            ConnectionDescriptor::new(server, database, login, password).connection_string()
        },
    );
    let insights_cs = composer.apply("insightsConnectionString", &instrumentation_key, |key| {
        format::insights_connection_string(&key)
    });

    let web_app = stack.declare(
        WEB_APP,
        ResourceKind::WebApp,
        properties([
            ("name", Input::from(config.app_name.as_str())),
            ("resourceGroupName", Input::from(rg.name())),
            ("location", Input::from(rg_location)),
            ("serverFarmId", Input::from(plan.id())),
            (
                "siteConfig",
                Input::object([
                    (
                        "appSettings",
                        Input::list([
                            app_setting("APPINSIGHTS_INSTRUMENTATIONKEY", instrumentation_key),
                            app_setting("APPLICATIONINSIGHTS_CONNECTION_STRING", insights_cs),
                            app_setting("ApplicationInsightsAgent_EXTENSION_VERSION", "~2"),
                            app_setting("WEBSITE_RUN_FROM_PACKAGE", signed_blob_url),
                        ]),
                    ),
                    (
                        "connectionStrings",
                        Input::list([Input::object([
                            ("name", Input::from("db")),
                            ("type", Input::from("SQLAzure")),
                            ("connectionString", Input::secret(db_connection_string)),
                        ])]),
                    ),
                ]),
            ),
        ]),
    );

    let endpoint = stack.composer_mut().try_apply(
        ENDPOINT_EXPORT,
        &output(&web_app, "defaultHostName"),
        |host| {
            if host.is_empty() {
                return Err(FormatError::new("default host name is empty"));
            }
            Ok(format::endpoint_url(&host))
        },
    );
    stack.export(ENDPOINT_EXPORT, endpoint);

    debug!(steps = stack.steps().len(), "declared app service stack");
    AppServiceStack {
        stack,
        signed_blob_url,
        db_connection_string,
        insights_connection_string: insights_cs,
        endpoint,
    }
}

/// Kind-specific output. `Stack::declare` registers every key in
/// `ResourceKind::output_keys`.
fn output(handle: &ResourceHandle, key: &str) -> Deferred<String> {
    handle.output(key).unwrap_or_else(|| handle.id())
}

fn app_setting(name: &str, value: impl Into<Input>) -> Input {
    Input::object([("name", Input::from(name)), ("value", value.into())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::stack::StepKind;
    use crate::deferred::RenderMode;
    use crate::domain::ValueState;
    use serde_json::json;

    fn declared() -> AppServiceStack {
        app_service_stack(&StackConfig::with_password("s3cr3t!"))
    }

    #[test]
    fn declares_nine_resources_and_one_sign_request() {
        let app = declared();
        let kinds: Vec<_> = app.stack.declarations().map(|d| d.kind).collect();

        assert_eq!(
            kinds,
            vec![
                ResourceKind::ResourceGroup,
                ResourceKind::StorageAccount,
                ResourceKind::AppServicePlan,
                ResourceKind::BlobContainer,
                ResourceKind::Blob,
                ResourceKind::InsightsComponent,
                ResourceKind::SqlServer,
                ResourceKind::SqlDatabase,
                ResourceKind::WebApp,
            ]
        );
        let signs = app
            .stack
            .steps()
            .iter()
            .filter(|s| matches!(s.kind, StepKind::SignSas { .. }))
            .count();
        assert_eq!(signs, 1);
    }

    #[test]
    fn only_endpoint_is_exported() {
        let app = declared();
        let names: Vec<_> = app.stack.exports().keys().cloned().collect();
        assert_eq!(names, vec!["endpoint".to_string()]);
        assert_eq!(app.stack.exports()["endpoint"], app.endpoint);
    }

    #[test]
    fn nothing_is_composed_before_provisioning() {
        let app = declared();
        let c = app.stack.composer();

        for value in [
            app.signed_blob_url,
            app.db_connection_string,
            app.insights_connection_string,
            app.endpoint,
        ] {
            assert_eq!(c.state(value.id()), Some(ValueState::Pending));
        }
        assert_eq!(c.invocations(), 0);
    }

    #[test]
    fn connection_string_composes_from_resolved_names() {
        let mut app = declared();
        let server = app.stack.resource(SQL_SERVER).unwrap().name();
        let database = app.stack.resource(SQL_DATABASE).unwrap().name();
        let c = app.stack.composer_mut();

        c.resolve(&server, "appservice-sql".to_string()).unwrap();
        assert!(!c.is_settled(app.db_connection_string.id()));
        c.resolve(&database, "appservice-db".to_string()).unwrap();

        assert_eq!(
            c.get(&app.db_connection_string).unwrap(),
            "Server=tcp:appservice-sql.database.windows.net;initial catalog=appservice-db;user ID=pulumi;password=s3cr3t!;Min Pool Size=0;Max Pool Size=30;Persist Security Info=true;"
        );
    }

    #[test]
    fn sql_password_is_a_secret_property() {
        let app = declared();
        let sql = app
            .stack
            .declarations()
            .find(|d| d.name == SQL_SERVER)
            .unwrap();
        let password = &sql.properties["administratorLoginPassword"];

        assert!(password.is_secret());
        assert_eq!(
            password.render(app.stack.composer(), RenderMode::Preview).unwrap(),
            json!("[secret]")
        );
    }

    #[test]
    fn app_name_comes_from_config() {
        let mut config = StackConfig::with_password("p");
        config.app_name = "myapp".to_string();
        let app = app_service_stack(&config);
        let web = app.stack.declarations().find(|d| d.name == WEB_APP).unwrap();

        assert_eq!(
            web.properties["name"].render(app.stack.composer(), RenderMode::Engine).unwrap(),
            json!("myapp")
        );
    }
}
