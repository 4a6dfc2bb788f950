//! Database connection management

use std::sync::Arc;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use crate::config::{Settings, StoreBackend};
use crate::utils::errors::StudyGroupError;
use super::memory::MemoryStore;
use super::postgres::PgStore;
use super::store::StoreHandle;

pub type DatabasePool = Pool<Postgres>;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/studygroup".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl From<&crate::config::DatabaseConfig> for DatabaseConfig {
    fn from(config: &crate::config::DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            ..Default::default()
        }
    }
}

/// Create a new database connection pool
pub async fn create_pool(config: &DatabaseConfig) -> Result<DatabasePool, StudyGroupError> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(&config.url)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await?;

    tracing::info!("Database connection pool created successfully");
    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), StudyGroupError> {
    tracing::info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Build the configured document store. PostgreSQL stores are migrated
/// before they are handed out.
pub async fn open_store(settings: &Settings) -> Result<StoreHandle, StudyGroupError> {
    match settings.database.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = create_pool(&DatabaseConfig::from(&settings.database)).await?;
            run_migrations(&pool).await?;
            let store = PgStore::connect(pool).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert!(config.url.contains("postgresql://"));
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let settings = Settings::default();
        let store = open_store(&settings).await.unwrap();
        assert!(store.health_check().await.is_ok());
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        settings.database.max_connections = 4;
        let config = DatabaseConfig::from(&settings.database);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
    }
}
