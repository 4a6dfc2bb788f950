//! Database module
//!
//! This module holds the document store boundary, its in-memory and
//! PostgreSQL implementations, and the optimistic transaction helper.

pub mod connection;
pub mod store;
pub mod memory;
pub mod postgres;
pub mod transaction;

// Re-export commonly used database components
pub use connection::{DatabasePool, DatabaseConfig, create_pool, run_migrations, open_store};
pub use store::{DocumentStore, StoreChange, StoreHandle};
pub use memory::{MemoryStore, StoreOperation};
pub use postgres::PgStore;
pub use transaction::run_event_transaction;
