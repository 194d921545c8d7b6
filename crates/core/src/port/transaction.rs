// Transaction port for atomic operations

use crate::error::Result;
use crate::port::store::{Command, Reply};
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Store commands within an exclusive scope
///
/// Everything executed in one scope is applied all-or-nothing and is
/// serialized against every other scope and command on the same store,
/// including those issued by other processes.
#[async_trait]
pub trait StoreTransaction: Transaction {
    async fn execute(&mut self, command: Command) -> Result<Reply>;
}
