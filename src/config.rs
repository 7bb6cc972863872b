use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default cap on a single inbound message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Domains offered at registration when nothing else is configured.
pub const DEFAULT_DOMAINS: &[&str] = &[
    "localhost.com",
    "emailserver.local",
    "testmail.dev",
    "myemail.local",
];

// ---------------------------------------------------------------------------
// Runtime config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub database_path: PathBuf,
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_domains() -> Vec<String> {
    DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect()
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: data_dir().join("mail.db"),
            domains: default_domains(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailstore")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailstore")
}

fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

impl Config {
    /// Try env vars. Returns None unless `MAILSTORE_DB` is set.
    fn from_env() -> Option<Self> {
        let database_path = std::env::var("MAILSTORE_DB").ok()?;
        let domains = std::env::var("MAILSTORE_DOMAINS")
            .ok()
            .map(|v| parse_domains(&v))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(default_domains);
        let max_message_bytes = std::env::var("MAILSTORE_MAX_MESSAGE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES);

        Some(Config {
            database_path: PathBuf::from(database_path),
            domains,
            max_message_bytes,
        })
    }

    fn from_file() -> Result<Option<Self>> {
        let path = config_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json(&data).map(Some)
    }

    fn from_json(data: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(data)
            .map_err(|e| Error::Config(format!("parse config: {e}")))?;
        config.domains = config
            .domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if config.domains.is_empty() {
            return Err(Error::Config("no registration domains configured".into()));
        }
        Ok(config)
    }

    /// Resolve config: env vars, then the config file, then defaults.
    pub fn load() -> Result<Self> {
        if let Some(config) = Self::from_env() {
            log::info!("Config loaded from environment variables");
            return Ok(config);
        }
        match Self::from_file()? {
            Some(config) => {
                log::info!("Config loaded from {}", config_path().display());
                Ok(config)
            }
            None => {
                log::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("create config dir: {e}")))?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize config: {e}")))?;
        fs::write(&path, data).map_err(|e| Error::Config(format!("write config: {e}")))
    }
}

fn parse_domains(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_offer_builtin_domains() {
        let config = Config::default();
        assert_eq!(config.domains.len(), 4);
        assert!(config.domains.iter().any(|d| d == "testmail.dev"));
        assert_eq!(config.max_message_bytes, DEFAULT_MAX_MESSAGE_BYTES);
        assert!(config.database_path.ends_with("mailstore/mail.db"));
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = Config::from_json(r#"{"database_path": "/tmp/m.db"}"#).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/m.db"));
        assert_eq!(config.domains, default_domains());
    }

    #[test]
    fn json_normalizes_domains() {
        let config = Config::from_json(
            r#"{"database_path": "m.db", "domains": [" Example.ORG ", ""], "max_message_bytes": 64}"#,
        )
        .unwrap();
        assert_eq!(config.domains, vec!["example.org".to_string()]);
        assert_eq!(config.max_message_bytes, 64);
    }

    #[test]
    fn json_without_usable_domains_is_rejected() {
        let err = Config::from_json(r#"{"database_path": "m.db", "domains": [" "]}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn domain_list_parsing() {
        assert_eq!(
            parse_domains("a.com, B.org,,"),
            vec!["a.com".to_string(), "b.org".to_string()]
        );
    }
}
