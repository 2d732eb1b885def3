// ABOUTME: Environment-driven configuration for the kvd server.
// ABOUTME: Selects the log backend and network binding, with validation.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KVD_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("KVD_LOG_BACKEND must be \"file\" or \"sqlite\", got {0:?}")]
    UnknownBackend(String),
}

/// Which durable medium backs the transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogBackend {
    File,
    Sqlite,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct KvdConfig {
    pub bind: SocketAddr,
    pub backend: LogBackend,
    pub log_file: PathBuf,
    pub db_path: PathBuf,
}

impl KvdConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Environment variables:
    /// - KVD_BIND: socket address to bind (default: 127.0.0.1:8080)
    /// - KVD_LOG_BACKEND: "file" or "sqlite" (default: file)
    /// - KVD_LOG_FILE: file backend path (default: transactions.log)
    /// - KVD_DB_PATH: sqlite backend path (default: transactions.db)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_str =
            std::env::var("KVD_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let backend = match std::env::var("KVD_LOG_BACKEND") {
            Ok(raw) => match raw.as_str() {
                "file" => LogBackend::File,
                "sqlite" => LogBackend::Sqlite,
                _ => return Err(ConfigError::UnknownBackend(raw)),
            },
            Err(_) => LogBackend::File,
        };

        let log_file = std::env::var("KVD_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("transactions.log"));

        let db_path = std::env::var("KVD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("transactions.db"));

        Ok(Self {
            bind,
            backend,
            log_file,
            db_path,
        })
    }
}
