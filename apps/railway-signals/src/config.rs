use std::{
    env,
    net::{AddrParseError, SocketAddr},
    str::FromStr,
};

use thiserror::Error;

#[derive(Clone, Debug)]
pub struct Config {
    pub service_name: String,
    pub bind_addr: SocketAddr,
    pub build_sha: String,
    pub db_url: Option<String>,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
    pub request_timeout_ms: u64,
    pub load_max_body_bytes: usize,
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid RAILWAY_BIND_ADDR: {0}")]
    BindAddrParse(#[from] AddrParseError),
    #[error("invalid RAILWAY_DEFAULT_PAGE_LIMIT: {0}")]
    InvalidDefaultPageLimit(String),
    #[error("invalid RAILWAY_MAX_PAGE_LIMIT: {0}")]
    InvalidMaxPageLimit(String),
    #[error("invalid RAILWAY_REQUEST_TIMEOUT_MS: {0}")]
    InvalidRequestTimeoutMs(String),
    #[error("invalid RAILWAY_LOAD_MAX_BODY_BYTES: {0}")]
    InvalidLoadMaxBodyBytes(String),
    #[error("invalid RAILWAY_LOG_FORMAT: {0}")]
    InvalidLogFormat(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests need not touch
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("RAILWAY_BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()?;
        let service_name =
            lookup("RAILWAY_SERVICE_NAME").unwrap_or_else(|| "railway-signals".to_string());
        let build_sha = lookup("RAILWAY_BUILD_SHA").unwrap_or_else(|| "dev".to_string());
        let db_url = lookup("DB_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let default_page_limit = lookup("RAILWAY_DEFAULT_PAGE_LIMIT")
            .unwrap_or_else(|| "100".to_string())
            .parse::<u32>()
            .map_err(|error| ConfigError::InvalidDefaultPageLimit(error.to_string()))?;
        let max_page_limit = lookup("RAILWAY_MAX_PAGE_LIMIT")
            .unwrap_or_else(|| "1000".to_string())
            .parse::<u32>()
            .map_err(|error| ConfigError::InvalidMaxPageLimit(error.to_string()))?;
        if default_page_limit > max_page_limit {
            return Err(ConfigError::InvalidDefaultPageLimit(format!(
                "{default_page_limit} exceeds RAILWAY_MAX_PAGE_LIMIT {max_page_limit}"
            )));
        }
        let request_timeout_ms = lookup("RAILWAY_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|| "30000".to_string())
            .parse::<u64>()
            .map_err(|error| ConfigError::InvalidRequestTimeoutMs(error.to_string()))?;
        if request_timeout_ms == 0 {
            return Err(ConfigError::InvalidRequestTimeoutMs(
                "must be greater than zero".to_string(),
            ));
        }
        let load_max_body_bytes = lookup("RAILWAY_LOAD_MAX_BODY_BYTES")
            .unwrap_or_else(|| (32 * 1024 * 1024).to_string())
            .parse::<usize>()
            .map_err(|error| ConfigError::InvalidLoadMaxBodyBytes(error.to_string()))?;
        let log_format = lookup("RAILWAY_LOG_FORMAT")
            .unwrap_or_else(|| "text".to_string())
            .parse::<LogFormat>()?;

        Ok(Self {
            service_name,
            bind_addr,
            build_sha,
            db_url,
            default_page_limit,
            max_page_limit,
            request_timeout_ms,
            load_max_body_bytes,
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        Config::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() -> Result<(), ConfigError> {
        let config = config_from(&[])?;
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(config.service_name, "railway-signals");
        assert_eq!(config.db_url, None);
        assert_eq!(config.default_page_limit, 100);
        assert_eq!(config.max_page_limit, 1000);
        assert_eq!(config.log_format, LogFormat::Text);
        Ok(())
    }

    #[test]
    fn database_url_falls_back_and_ignores_blank() -> Result<(), ConfigError> {
        let config = config_from(&[("DB_URL", "  "), ("DATABASE_URL", "postgres://db")])?;
        assert_eq!(config.db_url, None);

        let config = config_from(&[("DATABASE_URL", "postgres://db")])?;
        assert_eq!(config.db_url.as_deref(), Some("postgres://db"));
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("RAILWAY_BIND_ADDR", "nope")]),
            Err(ConfigError::BindAddrParse(_))
        ));
        assert!(matches!(
            config_from(&[("RAILWAY_DEFAULT_PAGE_LIMIT", "-1")]),
            Err(ConfigError::InvalidDefaultPageLimit(_))
        ));
        assert!(matches!(
            config_from(&[("RAILWAY_DEFAULT_PAGE_LIMIT", "500"), ("RAILWAY_MAX_PAGE_LIMIT", "50")]),
            Err(ConfigError::InvalidDefaultPageLimit(_))
        ));
        assert!(matches!(
            config_from(&[("RAILWAY_LOG_FORMAT", "xml")]),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }
}
