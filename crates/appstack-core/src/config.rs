//! Stack configuration.
//!
//! `sqlPassword` is required; everything else has a default. Keys use the
//! camelCase names; [`StackConfig::from_env`] maps `APPSTACK_*` variables onto
//! them so both sources go through the same parsing.

use std::collections::BTreeMap;
use std::env;

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::{SasError, Secret, ValidityWindow};

pub const SQL_PASSWORD: &str = "sqlPassword";
pub const SQL_LOGIN: &str = "sqlLogin";
pub const LOCATION: &str = "location";
pub const APP_NAME: &str = "appName";
pub const ARCHIVE_PATH: &str = "archivePath";
pub const SAS_START: &str = "sasStart";
pub const SAS_EXPIRY: &str = "sasExpiry";

const ENV_KEYS: [(&str, &str); 7] = [
    ("APPSTACK_SQL_PASSWORD", SQL_PASSWORD),
    ("APPSTACK_SQL_LOGIN", SQL_LOGIN),
    ("APPSTACK_LOCATION", LOCATION),
    ("APPSTACK_APP_NAME", APP_NAME),
    ("APPSTACK_ARCHIVE_PATH", ARCHIVE_PATH),
    ("APPSTACK_SAS_START", SAS_START),
    ("APPSTACK_SAS_EXPIRY", SAS_EXPIRY),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration value `{0}`")]
    Missing(String),

    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: String, message: String },

    #[error(transparent)]
    Window(#[from] SasError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    pub sql_password: Secret,
    pub sql_login: String,
    pub location: String,
    pub app_name: String,
    pub archive_path: String,
    pub sas_window: ValidityWindow,
}

impl StackConfig {
    /// Defaults for everything but the password.
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            sql_password: Secret::new(password),
            sql_login: "pulumi".to_string(),
            location: "westus2".to_string(),
            app_name: "appserviceas123".to_string(),
            archive_path: "wwwroot".to_string(),
            sas_window: ValidityWindow::default(),
        }
    }

    pub fn from_map(values: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let password = values
            .get(SQL_PASSWORD)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::Missing(SQL_PASSWORD.to_string()))?;
        let mut config = Self::with_password(password.as_str());

        if let Some(v) = non_empty(values, SQL_LOGIN)? {
            config.sql_login = v;
        }
        if let Some(v) = non_empty(values, LOCATION)? {
            config.location = v;
        }
        if let Some(v) = non_empty(values, APP_NAME)? {
            config.app_name = v;
        }
        if let Some(v) = non_empty(values, ARCHIVE_PATH)? {
            config.archive_path = v;
        }

        let start = date(values, SAS_START)?.unwrap_or(config.sas_window.start());
        let expiry = date(values, SAS_EXPIRY)?.unwrap_or(config.sas_window.expiry());
        config.sas_window = ValidityWindow::new(start, expiry)?;

        Ok(config)
    }

    /// Read `APPSTACK_*` variables, honouring a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(&BTreeMap::new())
    }

    /// Environment first, then `overrides` (camelCase keys) on top.
    pub fn load(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let mut values = env_values();
        values.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::from_map(&values)
    }
}

/// `APPSTACK_*` variables that are set, keyed by their camelCase names.
pub fn env_values() -> BTreeMap<String, String> {
    ENV_KEYS
        .iter()
        .filter_map(|(var, key)| env::var(var).ok().map(|v| (key.to_string(), v)))
        .collect()
}

fn non_empty(values: &BTreeMap<String, String>, key: &str) -> Result<Option<String>, ConfigError> {
    match values.get(key) {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Err(ConfigError::Invalid {
            key: key.to_string(),
            message: "must not be empty".to_string(),
        }),
        Some(v) => Ok(Some(v.trim().to_string())),
    }
}

fn date(values: &BTreeMap<String, String>, key: &str) -> Result<Option<NaiveDate>, ConfigError> {
    values
        .get(key)
        .map(|v| {
            NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn password_only_gives_defaults() {
        let config = StackConfig::from_map(&map(&[(SQL_PASSWORD, "hunter2")])).unwrap();

        assert_eq!(config.sql_password.expose(), "hunter2");
        assert_eq!(config.sql_login, "pulumi");
        assert_eq!(config.location, "westus2");
        assert_eq!(config.app_name, "appserviceas123");
        assert_eq!(config.archive_path, "wwwroot");
        assert_eq!(config.sas_window, ValidityWindow::default());
    }

    #[rstest]
    #[case::absent(&[])]
    #[case::empty(&[(SQL_PASSWORD, "")])]
    fn missing_password_is_fatal(#[case] pairs: &[(&str, &str)]) {
        let err = StackConfig::from_map(&map(pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("sqlPassword".to_string()));
    }

    #[test]
    fn overrides_are_applied() {
        let config = StackConfig::from_map(&map(&[
            (SQL_PASSWORD, "p"),
            (SQL_LOGIN, "admin"),
            (LOCATION, "northeurope"),
            (APP_NAME, "myapp"),
            (ARCHIVE_PATH, "site"),
            (SAS_START, "2024-01-01"),
            (SAS_EXPIRY, "2024-06-30"),
        ]))
        .unwrap();

        assert_eq!(config.sql_login, "admin");
        assert_eq!(config.location, "northeurope");
        assert_eq!(config.app_name, "myapp");
        assert_eq!(config.archive_path, "site");
        assert_eq!(config.sas_window.start(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(config.sas_window.expiry(), NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
    }

    #[test]
    fn reversed_window_is_rejected() {
        let err = StackConfig::from_map(&map(&[
            (SQL_PASSWORD, "p"),
            (SAS_START, "2031-01-01"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Window(SasError::EmptyWindow { .. })));
    }

    #[rstest]
    #[case::bad_date(SAS_EXPIRY, "next year")]
    #[case::blank_login(SQL_LOGIN, "  ")]
    fn invalid_values_name_their_key(#[case] key: &str, #[case] value: &str) {
        let err = StackConfig::from_map(&map(&[(SQL_PASSWORD, "p"), (key, value)])).unwrap_err();
        match err {
            ConfigError::Invalid { key: k, .. } => assert_eq!(k, key),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn debug_output_hides_password() {
        let config = StackConfig::with_password("hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
