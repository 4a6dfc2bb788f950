//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{StudyGroupError, Result};
use super::settings::StoreBackend;
use super::Settings;

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_database_config(&settings.database)?;
    validate_logging_config(&settings.logging)?;
    validate_auth_config(&settings.auth)?;
    validate_membership_config(&settings.membership)?;
    validate_chat_config(&settings.chat)?;
    validate_discovery_config(&settings.discovery)?;
    validate_background_config(&settings.background)?;

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.backend == StoreBackend::Memory {
        return Ok(());
    }

    if config.url.is_empty() {
        return Err(StudyGroupError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(StudyGroupError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(StudyGroupError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(StudyGroupError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(StudyGroupError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}

fn validate_auth_config(config: &super::AuthConfig) -> Result<()> {
    if let Some(secret) = &config.jwt_secret {
        if secret.len() < 16 {
            return Err(StudyGroupError::Config(
                "JWT secret must be at least 16 characters".to_string()
            ));
        }
    }

    Ok(())
}

/// Validate the optimistic transaction retry policy
fn validate_membership_config(config: &super::MembershipConfig) -> Result<()> {
    if config.max_transaction_attempts == 0 {
        return Err(StudyGroupError::Config(
            "Transaction attempts must be greater than 0".to_string()
        ));
    }

    if config.base_backoff_ms > config.max_backoff_ms {
        return Err(StudyGroupError::Config(
            "Base backoff cannot be greater than max backoff".to_string()
        ));
    }

    Ok(())
}

fn validate_chat_config(config: &super::ChatConfig) -> Result<()> {
    if config.max_subscriptions_per_client == 0 {
        return Err(StudyGroupError::Config(
            "At least one chat subscription per client must be allowed".to_string()
        ));
    }

    Ok(())
}

/// Validate discovery configuration
fn validate_discovery_config(config: &super::DiscoveryConfig) -> Result<()> {
    if !(config.default_radius_km.is_finite() && config.default_radius_km > 0.0) {
        return Err(StudyGroupError::Config(
            format!("Default radius must be a positive distance, got {}", config.default_radius_km)
        ));
    }

    if config.in_clause_limit == 0 {
        return Err(StudyGroupError::Config(
            "IN-clause limit must be greater than 0".to_string()
        ));
    }

    Ok(())
}

fn validate_background_config(config: &super::BackgroundConfig) -> Result<()> {
    if config.queue_capacity == 0 {
        return Err(StudyGroupError::Config(
            "Background queue capacity must be greater than 0".to_string()
        ));
    }

    Ok(())
}
