// SQLite Transaction Implementation

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;
use taskmill_core::error::{AppError, Result};
use taskmill_core::port::{Command, Reply, StoreTransaction, Transaction};
use tracing::warn;

use crate::commands;
use crate::error::map_sqlx_error;

/// Exclusive scope over one pooled connection
///
/// `BEGIN IMMEDIATE` takes SQLite's write lock up front, so scopes never
/// deadlock on a read-to-write upgrade and are serialized across processes.
pub struct SqliteStoreTransaction {
    conn: Option<PoolConnection<Sqlite>>,
}

impl SqliteStoreTransaction {
    pub(crate) async fn begin(mut conn: PoolConnection<Sqlite>) -> Result<Self> {
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self { conn: Some(conn) })
    }

    /// End the scope and hand the connection back
    ///
    /// A connection whose COMMIT/ROLLBACK failed may still be mid-transaction
    /// and is detached from the pool.
    pub(crate) async fn finish(&mut self, statement: &str) -> Result<PoolConnection<Sqlite>> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| AppError::Store("transaction already finished".to_string()))?;

        match sqlx::query(statement).execute(&mut *conn).await {
            Ok(_) => Ok(conn),
            Err(err) => {
                drop(conn.detach());
                Err(map_sqlx_error(err))
            }
        }
    }
}

#[async_trait]
impl Transaction for SqliteStoreTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await.map(drop)
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await.map(drop)
    }
}

#[async_trait]
impl StoreTransaction for SqliteStoreTransaction {
    async fn execute(&mut self, command: Command) -> Result<Reply> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| AppError::Store("transaction already finished".to_string()))?;
        commands::apply(conn, command).await
    }
}

impl Drop for SqliteStoreTransaction {
    fn drop(&mut self) {
        // Dropped mid-scope: the connection still holds the write lock
        if let Some(conn) = self.conn.take() {
            warn!("Store transaction dropped without commit or rollback; closing its connection");
            drop(conn.detach());
        }
    }
}
