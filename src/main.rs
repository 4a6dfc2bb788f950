//! StudyGroupFinder
//!
//! Main application entry point

use std::sync::Arc;
use anyhow::Context;
use tracing::{error, info, warn};

use StudyGroupFinder::{
    config::Settings,
    database::open_store,
    services::{AuthProvider, ServiceFactory, SessionAuth, TokenAuth},
    utils::logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;
    settings.validate()?;

    // Initialize logging; the guard flushes the file writer on exit
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", StudyGroupFinder::info());

    info!(backend = ?settings.database.backend, "Opening document store...");
    let store = open_store(&settings).await?;

    let auth: Arc<dyn AuthProvider> = match settings.auth.jwt_secret {
        Some(_) => {
            info!("Identity tokens enabled");
            Arc::new(TokenAuth::from_config(&settings.auth)?)
        }
        None => Arc::new(SessionAuth::new()),
    };

    info!("Initializing services...");
    let services = ServiceFactory::new(&settings, store, auth);

    let health = services.health_check().await;
    if !health.is_healthy() {
        for issue in health.get_issues() {
            error!(issue = %issue, "Service health check failed");
        }
        anyhow::bail!("Services are not healthy");
    }

    info!("StudyGroupFinder is ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutting down...");
    services.shutdown().await;
    info!("StudyGroupFinder has been shut down.");

    Ok(())
}
