use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

use crate::capabilities::http::MAX_TIMEOUT_MS;
use crate::{ErrorInfo, DEFAULT_ID_FIELD, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub const ENV_BASE_URL: &str = "ADMIN_CONSOLE_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "ADMIN_CONSOLE_TIMEOUT_MS";
pub const ENV_PAGE_SIZE: &str = "ADMIN_CONSOLE_PAGE_SIZE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<ConfigError> for ErrorInfo {
    fn from(e: ConfigError) -> Self {
        ErrorInfo::invalid_request(e.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// API root; resource paths are appended to it.
    pub base_url: String,
    pub timeout_ms: u64,
    pub default_page_size: usize,
    pub id_field: String,
    /// Query parameter names used when a screen asks the backend to filter.
    pub page_param: String,
    pub page_size_param: String,
    pub search_param: String,
    pub user_agent: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout_ms: 30_000,
            default_page_size: DEFAULT_PAGE_SIZE,
            id_field: DEFAULT_ID_FIELD.to_string(),
            page_param: "page".to_string(),
            page_size_param: "limit".to_string(),
            search_param: "search".to_string(),
            user_agent: concat!("admin-console/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ConsoleConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Overlay `ADMIN_CONSOLE_*` environment variables.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "timeout_ms",
                reason: format!("'{raw}' is not a number"),
            })?;
        }
        if let Some(raw) = lookup(ENV_PAGE_SIZE) {
            self.default_page_size =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "default_page_size",
                    reason: format!("'{raw}' is not a number"),
                })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.timeout_ms == 0 || self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue {
                field: "timeout_ms",
                reason: format!("must be in 1..={MAX_TIMEOUT_MS}"),
            });
        }
        if self.default_page_size == 0 || self.default_page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "default_page_size",
                reason: format!("must be in 1..={MAX_PAGE_SIZE}"),
            });
        }
        if self.id_field.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "id_field",
                reason: "cannot be empty".into(),
            });
        }
        for (field, value) in [
            ("page_param", &self.page_param),
            ("page_size_param", &self.page_size_param),
            ("search_param", &self.search_param),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "cannot be empty".into(),
                });
            }
        }
        Ok(())
    }

    /// Parsed base URL, always ending in `/` so relative joins keep the prefix.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".into()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("must not carry a query or fragment".into()));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(ConsoleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            ConsoleConfig::from_json_str(r#"{"base_url": "https://admin.example.com/v1"}"#)
                .unwrap();
        assert_eq!(config.base_url, "https://admin.example.com/v1");
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.id_field, "id");
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = ConsoleConfig {
            base_url: "https://admin.example.com/v1".into(),
            ..Default::default()
        };
        assert_eq!(config.base_url().unwrap().as_str(), "https://admin.example.com/v1/");
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_url = ConsoleConfig {
            base_url: "ftp://x".into(),
            ..Default::default()
        };
        assert!(matches!(
            bad_url.validate(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        let zero_page = ConsoleConfig {
            default_page_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_page.validate(),
            Err(ConfigError::InvalidValue {
                field: "default_page_size",
                ..
            })
        ));

        let with_query = ConsoleConfig {
            base_url: "https://x.example.com/api?x=1".into(),
            ..Default::default()
        };
        assert!(with_query.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_BASE_URL, "https://staging.example.com/api"),
            (ENV_PAGE_SIZE, "25"),
        ]
        .into_iter()
        .collect();

        let config = ConsoleConfig::default()
            .apply_overrides(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.base_url, "https://staging.example.com/api");
        assert_eq!(config.default_page_size, 25);
        assert_eq!(config.timeout_ms, 30_000);
    }

    #[test]
    fn test_override_not_a_number() {
        let result = ConsoleConfig::default()
            .apply_overrides(|k| (k == ENV_TIMEOUT_MS).then(|| "soon".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "timeout_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"base_url": "https://admin.example.com", "id_field": "_id"}}"#
        )
        .unwrap();

        let config = ConsoleConfig::from_file(file.path()).unwrap();
        assert_eq!(config.id_field, "_id");
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            ConsoleConfig::from_file("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
