//! Environment-driven configuration, loaded once at process start.

use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::common::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub api_key: String,
    pub connection_timeout: Duration,
}

impl SearchConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    pub allowlist: Vec<String>,
    /// Hex SHA-256 of the editorial password; unset means no password gate
    /// (development only).
    pub password_sha256: Option<String>,
}

impl AdminConfig {
    pub fn verify_password(&self, password: &str) -> bool {
        match &self.password_sha256 {
            None => true,
            Some(expected) => {
                let digest = hex::encode(Sha256::digest(password.as_bytes()));
                digest.eq_ignore_ascii_case(expected)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub registry_dir: PathBuf,
    pub data_dir: PathBuf,
    pub search: SearchConfig,
    pub admin: AdminConfig,
    pub metrics_port: Option<u16>,
    /// Parallel fetch workers; defaults to the number of enabled sources.
    pub fetch_concurrency: Option<usize>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let search = SearchConfig {
            host: env_or("TYPESENSE_HOST", "localhost"),
            port: parse_env("TYPESENSE_PORT", 8108)?,
            protocol: env_or("TYPESENSE_PROTOCOL", "http"),
            api_key: env_or("TYPESENSE_API_KEY", ""),
            connection_timeout: Duration::from_secs(parse_env(
                "TYPESENSE_CONNECTION_TIMEOUT_SECONDS",
                10,
            )?),
        };
        let admin = AdminConfig {
            allowlist: std::env::var("MOUSSEM_ADMIN_ALLOWLIST")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            password_sha256: std::env::var("MOUSSEM_ADMIN_PASSWORD_SHA256").ok(),
        };
        Ok(Self {
            database_path: PathBuf::from(env_or("MOUSSEM_DATABASE_PATH", "data/moussem.db")),
            registry_dir: PathBuf::from(env_or("MOUSSEM_REGISTRY_DIR", "registry/sources")),
            data_dir: PathBuf::from(env_or("MOUSSEM_DATA_DIR", "data")),
            search,
            admin,
            metrics_port: optional_env("MOUSSEM_METRICS_PORT")?,
            fetch_concurrency: optional_env("MOUSSEM_FETCH_CONCURRENCY")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| PipelineError::Validation {
            message: format!("{key}='{raw}' is not valid"),
        }),
        Err(_) => Ok(default),
    }
}

fn optional_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::Validation {
                message: format!("{key}='{raw}' is not valid"),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_digest_is_checked_case_insensitively() {
        let admin = AdminConfig {
            allowlist: vec![],
            // sha256("s3cret")
            password_sha256: Some(
                "1EC1C26B50D5D3C58D9583181AF8076655FE00756BF7285940BA3670F99FCBA0".to_string(),
            ),
        };
        assert!(admin.verify_password("s3cret"));
        assert!(!admin.verify_password("wrong"));
    }
}
