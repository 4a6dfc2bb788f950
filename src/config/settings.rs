//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use serde::{Deserialize, Serialize};

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub membership: MembershipConfig,
    pub chat: ChatConfig,
    pub discovery: DiscoveryConfig,
    pub background: BackgroundConfig,
}

/// Which document store backs the services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory receiving the daily rolling log file
    pub file_path: String,
}

/// Identity token configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
}

/// Optimistic transaction retry policy for join/leave
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MembershipConfig {
    pub max_transaction_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// Chat configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    pub max_subscriptions_per_client: usize,
}

/// Event discovery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    pub default_radius_km: f64,
    /// Largest id list a single store lookup accepts
    pub in_clause_limit: usize,
}

/// Best-effort task queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackgroundConfig {
    pub queue_capacity: usize,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::from_file("config")
    }

    /// Load settings layered over the defaults from the given file (optional)
    /// and `STUDYGROUP__*` environment variables
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&Settings::default())?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("STUDYGROUP").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::StudyGroupError> {
        super::validation::validate_settings(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: "postgresql://localhost/studygroup".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: "logs".to_string(),
            },
            auth: AuthConfig::default(),
            membership: MembershipConfig {
                max_transaction_attempts: 5,
                base_backoff_ms: 10,
                max_backoff_ms: 500,
            },
            chat: ChatConfig {
                max_subscriptions_per_client: 8,
            },
            discovery: DiscoveryConfig {
                default_radius_km: 10.0,
                in_clause_limit: 30,
            },
            background: BackgroundConfig {
                queue_capacity: 256,
            },
        }
    }
}
