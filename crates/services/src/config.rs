//! Client configuration loaded from the environment at startup.
//!
//! A `.env` file in the working directory is honoured outside tests.

use std::collections::HashMap;
use std::env;

use chrono::Duration;
use study_core::debounce::DebouncePolicy;
use study_core::model::{DEFAULT_PERSISTED_PREFIX, IdConvention};
use tracing::Level;
use url::Url;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("missing the environment variable {0}")]
    MissingVar(String),
    #[error("invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_DB_URL: &str = "sqlite://study.sqlite3";

/// Everything the client needs to talk to the backend and keep local state.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: Url,
    pub api_token: Option<String>,
    pub database_url: String,
    pub id_convention: IdConvention,
    pub edit_debounce: DebouncePolicy,
    pub copied_flag_ttl: Duration,
    pub log_level: Level,
}

impl ClientConfig {
    /// Load configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a required variable is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an explicit key/value map.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_base = lookup("STUDY_API_BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("STUDY_API_BASE_URL".to_string()))?;
        let api_base_url = parse_base_url(raw_base.trim())?;

        let api_token = lookup("STUDY_API_TOKEN").filter(|token| !token.trim().is_empty());

        let database_url =
            lookup("STUDY_DB_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        let prefix = lookup("STUDY_PERSISTED_ID_PREFIX")
            .unwrap_or_else(|| DEFAULT_PERSISTED_PREFIX.to_string());
        let id_convention = IdConvention::with_prefix(prefix).map_err(|e| {
            ConfigError::InvalidValue("STUDY_PERSISTED_ID_PREFIX".to_string(), e.to_string())
        })?;

        let debounce_ms = parse_millis(&lookup, "STUDY_EDIT_DEBOUNCE_MS", 1_000)?;
        let copied_ms = parse_millis(&lookup, "STUDY_COPIED_FLAG_MS", 2_000)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{log_level_str}' is not a valid log level"),
            )
        })?;

        Ok(Self {
            api_base_url,
            api_token,
            database_url,
            id_convention,
            edit_debounce: DebouncePolicy::from_millis(debounce_ms),
            copied_flag_ttl: Duration::milliseconds(copied_ms),
            log_level,
        })
    }
}

/// Parses the API root, forcing a trailing slash so relative joins keep the path.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|e| {
        ConfigError::InvalidValue("STUDY_API_BASE_URL".to_string(), e.to_string())
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidValue(
            "STUDY_API_BASE_URL".to_string(),
            format!("'{raw}' cannot be used as a base URL"),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map(i64::from)
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_only_base_url_is_set() {
        let config =
            ClientConfig::from_map(&vars(&[("STUDY_API_BASE_URL", "https://api.example.com/v1")]))
                .unwrap();
        assert_eq!(config.api_base_url.as_str(), "https://api.example.com/v1/");
        assert_eq!(config.api_token, None);
        assert_eq!(config.database_url, DEFAULT_DB_URL);
        assert_eq!(config.id_convention, IdConvention::default());
        assert_eq!(config.edit_debounce, DebouncePolicy::default());
        assert_eq!(config.copied_flag_ttl, Duration::seconds(2));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn base_url_is_required() {
        let err = ClientConfig::from_map(&vars(&[("STUDY_API_TOKEN", "t")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("STUDY_API_BASE_URL".into()));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = ClientConfig::from_map(&vars(&[
            ("STUDY_API_BASE_URL", "https://api.example.com"),
            ("STUDY_EDIT_DEBOUNCE_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref key, _) if key == "STUDY_EDIT_DEBOUNCE_MS"));

        let err = ClientConfig::from_map(&vars(&[
            ("STUDY_API_BASE_URL", "https://api.example.com"),
            ("STUDY_PERSISTED_ID_PREFIX", ""),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref key, _) if key == "STUDY_PERSISTED_ID_PREFIX"));

        let err = ClientConfig::from_map(&vars(&[("STUDY_API_BASE_URL", "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref key, _) if key == "STUDY_API_BASE_URL"));
    }

    #[test]
    fn overrides_are_honoured() {
        let config = ClientConfig::from_map(&vars(&[
            ("STUDY_API_BASE_URL", "http://localhost:8080/"),
            ("STUDY_API_TOKEN", "secret"),
            ("STUDY_DB_URL", "sqlite::memory:"),
            ("STUDY_PERSISTED_ID_PREFIX", "card_"),
            ("STUDY_EDIT_DEBOUNCE_MS", "250"),
            ("RUST_LOG", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert!(config.id_convention.is_persisted("card_9"));
        assert!(!config.id_convention.is_persisted("cfc-9"));
        assert_eq!(config.edit_debounce, DebouncePolicy::from_millis(250));
        assert_eq!(config.log_level, Level::DEBUG);
    }
}
