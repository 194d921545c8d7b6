// Taskmill Infrastructure - SQLite Adapter
// Implements: KeyValueStore, StoreTransaction

mod commands;
mod connection;
mod error;
mod migration;
mod store;
mod transaction;

pub use connection::{
    create_pool, StoreConfig, DEFAULT_BUSY_TIMEOUT, DEFAULT_DATABASE_URL, DEFAULT_MAX_CONNECTIONS,
};
pub use migration::{current_version, run_migrations};
pub use store::SqliteStore;
pub use transaction::SqliteStoreTransaction;

// Note: sqlx::Error conversion is handled by map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
