//! SAS request model.
//!
//! A `SasRequest` is handed to the provisioning engine as-is; the engine
//! answers with an opaque token. Nothing here signs anything.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::format::canonical_resource;

/// Protocols the token is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpProtocol {
    #[serde(rename = "https")]
    Https,
    #[serde(rename = "https,http")]
    HttpsHttp,
}

impl HttpProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Https => "https",
            Self::HttpsHttp => "https,http",
        }
    }
}

/// Kind of storage resource the signature covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignedResource {
    #[serde(rename = "b")]
    Blob,
    #[serde(rename = "c")]
    Container,
    #[serde(rename = "f")]
    File,
    #[serde(rename = "s")]
    Share,
}

impl SignedResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "b",
            Self::Container => "c",
            Self::File => "f",
            Self::Share => "s",
        }
    }
}

/// Permission letters granted by the token, kept in canonical `racwdl` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
}

impl Permissions {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn letters(&self) -> String {
        [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.list, 'l'),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, c)| *c)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SasError {
    #[error("validity window start {start} must precede expiry {expiry}")]
    EmptyWindow { start: NaiveDate, expiry: NaiveDate },
}

/// Time bounds of a signature. `start` is strictly before `expiry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidityWindow {
    start: NaiveDate,
    expiry: NaiveDate,
}

impl ValidityWindow {
    pub fn new(start: NaiveDate, expiry: NaiveDate) -> Result<Self, SasError> {
        if start >= expiry {
            return Err(SasError::EmptyWindow { start, expiry });
        }
        Ok(Self { start, expiry })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn expiry(&self) -> NaiveDate {
        self.expiry
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.expiry
    }
}

impl Default for ValidityWindow {
    /// 2021-01-01 .. 2030-01-01
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or_default(),
            expiry: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap_or(NaiveDate::MAX),
        }
    }
}

/// Service SAS request for a blob inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SasRequest {
    pub account_name: String,
    pub container_name: String,
    pub blob_name: String,
    pub resource_group_name: String,
    pub protocol: HttpProtocol,
    pub window: ValidityWindow,
    pub resource: SignedResource,
    pub permissions: Permissions,
    pub canonicalized_resource: String,
    pub content_type: String,
    pub cache_control: String,
    pub content_disposition: String,
    pub content_encoding: String,
}

impl SasRequest {
    /// Read-only, HTTPS-only container signature with the response headers
    /// the packaged application archive is served with.
    pub fn for_blob(
        account_name: impl Into<String>,
        container_name: impl Into<String>,
        blob_name: impl Into<String>,
        resource_group_name: impl Into<String>,
        window: ValidityWindow,
    ) -> Self {
        let account_name = account_name.into();
        let container_name = container_name.into();
        let canonicalized_resource = canonical_resource(&account_name, &container_name);
        Self {
            account_name,
            container_name,
            blob_name: blob_name.into(),
            resource_group_name: resource_group_name.into(),
            protocol: HttpProtocol::Https,
            window,
            resource: SignedResource::Container,
            permissions: Permissions::read_only(),
            canonicalized_resource,
            content_type: "application/json".to_string(),
            cache_control: "max-age=5".to_string(),
            content_disposition: "inline".to_string(),
            content_encoding: "deflate".to_string(),
        }
    }
}
