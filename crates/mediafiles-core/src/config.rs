//! Configuration module
//!
//! Settings are read from the process environment (and an optional `.env` file)
//! once at startup, then validated before any component is built from them.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::constants::MIME_SAMPLE_BYTES;
use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const WORKER_MAX_WORKERS: usize = 4;
const WORKER_QUEUE_CAPACITY: usize = 256;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub log_format: LogFormat,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    // Database configuration; in-memory persistence is used when unset
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Worker pool configuration
    pub worker_enabled: bool,
    pub worker_max_workers: usize,
    pub worker_queue_capacity: usize,
    // Media processing configuration
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub mime_sample_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let log_format = env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .parse::<LogFormat>()?;

        let storage_backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<StorageBackend>()?;

        let config = Config {
            environment,
            log_format,
            storage_backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .ok()
                .or_else(|| Some("./media".to_string())),
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            worker_enabled: env::var("WORKER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(true),
            worker_max_workers: env::var("WORKER_MAX_WORKERS")
                .unwrap_or_else(|_| WORKER_MAX_WORKERS.to_string())
                .parse()
                .unwrap_or(WORKER_MAX_WORKERS),
            worker_queue_capacity: env::var("WORKER_QUEUE_CAPACITY")
                .unwrap_or_else(|_| WORKER_QUEUE_CAPACITY.to_string())
                .parse()
                .unwrap_or(WORKER_QUEUE_CAPACITY),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            mime_sample_bytes: env::var("MIME_SAMPLE_BYTES")
                .unwrap_or_else(|_| MIME_SAMPLE_BYTES.to_string())
                .parse()
                .unwrap_or(MIME_SAMPLE_BYTES),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.storage_backend == StorageBackend::Local
            && self
                .local_storage_path
                .as_deref()
                .map(|p| p.trim().is_empty())
                .unwrap_or(true)
        {
            return Err(anyhow::anyhow!(
                "LOCAL_STORAGE_PATH must be set when STORAGE_BACKEND=local"
            ));
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.worker_max_workers == 0 {
            return Err(anyhow::anyhow!("WORKER_MAX_WORKERS must be at least 1"));
        }

        if self.worker_queue_capacity == 0 {
            return Err(anyhow::anyhow!("WORKER_QUEUE_CAPACITY must be at least 1"));
        }

        if self.mime_sample_bytes == 0 {
            return Err(anyhow::anyhow!("MIME_SAMPLE_BYTES must be greater than 0"));
        }

        Ok(())
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.local_storage_path.as_deref()
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_format: LogFormat::Pretty,
            storage_backend: StorageBackend::Memory,
            local_storage_path: None,
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            worker_enabled: true,
            worker_max_workers: WORKER_MAX_WORKERS,
            worker_queue_capacity: WORKER_QUEUE_CAPACITY,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            mime_sample_bytes: MIME_SAMPLE_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn local_backend_requires_path() {
        let config = Config {
            storage_backend: StorageBackend::Local,
            local_storage_path: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_postgres_database_url() {
        let config = Config {
            database_url: Some("mysql://localhost/media".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            database_url: Some("postgres://localhost/media".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let config = Config {
            worker_max_workers: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
