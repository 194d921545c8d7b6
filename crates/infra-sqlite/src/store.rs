// SQLite KeyValueStore Implementation

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool};
use taskmill_core::error::Result;
use taskmill_core::port::{Command, KeyValueStore, Reply, StoreTransaction};
use tracing::{debug, warn};

use crate::commands;
use crate::connection::{create_pool, StoreConfig};
use crate::error::map_sqlx_error;
use crate::migration::run_migrations;
use crate::transaction::SqliteStoreTransaction;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the pool and bring the schema up to date
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool.acquire().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn execute(&self, command: Command) -> Result<Reply> {
        let conn = self.acquire().await?;
        let (reply, _conn) = execute_standalone(conn, command).await?;
        Ok(reply)
    }

    async fn execute_batch(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        debug!(commands = commands.len(), "Executing batch");
        let mut conn = self.acquire().await?;
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            let (reply, returned) = execute_standalone(conn, command).await?;
            replies.push(reply);
            conn = returned;
        }
        Ok(replies)
    }

    async fn begin_atomic(&self) -> Result<Box<dyn StoreTransaction>> {
        let conn = self.acquire().await?;
        let tx = SqliteStoreTransaction::begin(conn).await?;
        Ok(Box::new(tx))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

/// Run one command atomically on its own
///
/// Reads are single statements; writes get their own IMMEDIATE transaction.
async fn execute_standalone(
    mut conn: PoolConnection<Sqlite>,
    command: Command,
) -> Result<(Reply, PoolConnection<Sqlite>)> {
    if !command.is_write() {
        let reply = commands::apply(&mut conn, command).await?;
        return Ok((reply, conn));
    }

    let mut tx = SqliteStoreTransaction::begin(conn).await?;
    match tx.execute(command).await {
        Ok(reply) => Ok((reply, tx.finish("COMMIT").await?)),
        Err(err) => {
            if let Err(rollback_err) = tx.finish("ROLLBACK").await {
                warn!(error = %rollback_err, "Rollback after failed command also failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> SqliteStore {
        SqliteStore::connect(&StoreConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let store = setup_store().await;
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_batch_replies_follow_command_order() {
        let store = setup_store().await;
        let replies = store
            .execute_batch(vec![
                Command::SetAdd {
                    key: "s".to_string(),
                    member: "a".to_string(),
                },
                Command::SetAdd {
                    key: "s".to_string(),
                    member: "a".to_string(),
                },
                Command::SetCard {
                    key: "s".to_string(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(replies, vec![Reply::Int(1), Reply::Int(0), Reply::Int(1)]);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_commands() {
        let store = setup_store().await;
        let result = store
            .execute_batch(vec![
                Command::HashSet {
                    key: "h".to_string(),
                    fields: vec![("n".to_string(), "x".to_string())],
                },
                Command::HashIncrBy {
                    key: "h".to_string(),
                    field: "n".to_string(),
                    delta: 1,
                },
            ])
            .await;
        assert!(result.is_err());

        let value = store
            .execute(Command::HashGet {
                key: "h".to_string(),
                field: "n".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(value, Reply::Value(Some("x".to_string())));
    }

    #[tokio::test]
    async fn test_dropped_scope_does_not_apply() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
        let store = SqliteStore::connect(&StoreConfig::new(url)).await.unwrap();

        {
            let mut tx = store.begin_atomic().await.unwrap();
            tx.execute(Command::SetAdd {
                key: "s".to_string(),
                member: "a".to_string(),
            })
            .await
            .unwrap();
        }

        let card = store
            .execute(Command::SetCard {
                key: "s".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(card, Reply::Int(0));
    }
}
