// Port Layer - Interfaces for external dependencies

pub mod store;
pub mod transaction;

// Re-exports
pub use store::{Command, KeyValueStore, Reply};
pub use transaction::{StoreTransaction, Transaction};

#[cfg(test)]
pub use store::MockKeyValueStore;
