//! StudyGroupFinder
//!
//! Backend core for discovering, joining and chatting around location-based
//! study-group events. This library provides the event store, capacity-safe
//! membership, chat roster synchronization and geographic discovery on top
//! of a pluggable document store.

#![allow(non_snake_case)]

pub mod config;
pub mod services;
pub mod models;
pub mod database;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{StudyGroupError, Result};

// Re-export main components for easy access
pub use database::{DocumentStore, MemoryStore, PgStore, StoreHandle};
pub use services::ServiceFactory;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
