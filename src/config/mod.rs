//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Score API base URL
    pub arcapi_url: String,
    /// Score API deployment codename path segment
    pub arcapi_codename: String,
    /// Score API version path segment
    pub arcapi_version: String,
    /// Bearer token for the score API
    pub arcapi_token: String,
    /// AppVersion header the score API expects
    pub arcapi_app_version: String,
    /// DeviceId header the score API expects
    pub arcapi_device_id: String,

    /// Path to the song catalog JSON file
    pub catalog_path: String,
    /// Upper bound on simultaneous score fetches
    pub max_concurrent_polls: usize,

    /// Allowed client origin for CORS (comma-separated for multiple)
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let max_concurrent_polls = match env::var("MAX_CONCURRENT_POLLS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("MAX_CONCURRENT_POLLS"))?,
            Err(_) => 2,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            arcapi_url: env::var("ARCAPI_URL").map_err(|_| ConfigError::Missing("ARCAPI_URL"))?,
            arcapi_codename: env::var("ARCAPI_CODENAME")
                .map_err(|_| ConfigError::Missing("ARCAPI_CODENAME"))?,
            arcapi_version: env::var("ARCAPI_VERSION")
                .map_err(|_| ConfigError::Missing("ARCAPI_VERSION"))?,
            arcapi_token: env::var("ARCAPI_TOKEN")
                .map_err(|_| ConfigError::Missing("ARCAPI_TOKEN"))?,
            arcapi_app_version: env::var("ARCAPI_APP_VERSION")
                .map_err(|_| ConfigError::Missing("ARCAPI_APP_VERSION"))?,
            arcapi_device_id: env::var("ARCAPI_DEVICE_ID")
                .map_err(|_| ConfigError::Missing("ARCAPI_DEVICE_ID"))?,

            catalog_path: env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "songlist.json".to_string()),
            max_concurrent_polls,

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Environment variable {0} is not a number")]
    InvalidNumber(&'static str),
}
