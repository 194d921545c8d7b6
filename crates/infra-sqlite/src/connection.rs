// SQLite Connection Pool Setup

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use taskmill_core::error::{AppError, Result};
use tracing::debug;

use crate::error::map_sqlx_error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://~/.taskmill/jobs.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the shared store lives and how to reach it
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long a connection waits on SQLite's write lock
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Private in-memory database, mostly for tests
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Database URL with `~` in the file path expanded
    pub fn resolved_url(&self) -> String {
        match split_path(&self.database_url) {
            Some((scheme, path)) => format!("{}{}", scheme, shellexpand::tilde(path)),
            None => self.database_url.clone(),
        }
    }
}

/// `sqlite://path?query` -> ("sqlite://", "path?query")
fn split_path(url: &str) -> Option<(&str, &str)> {
    ["sqlite://", "sqlite:"]
        .into_iter()
        .find_map(|scheme| url.strip_prefix(scheme).map(|rest| (scheme, rest)))
        .filter(|(_, rest)| !rest.starts_with(":memory:"))
}

/// Create SQLite connection pool with WAL mode
///
/// In-memory databases live and die with their connection, so the pool is
/// pinned to a single connection that is never recycled.
pub async fn create_pool(config: &StoreConfig) -> Result<SqlitePool> {
    let url = config.resolved_url();
    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|e| AppError::Config(format!("Invalid database URL '{}': {}", url, e)))?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.busy_timeout)
        .create_if_missing(true);

    if !config.is_in_memory() {
        if let Some(dir) = options.get_filename().parent().filter(|p| !p.as_os_str().is_empty())
        {
            ensure_dir(dir).await?;
        }
    }

    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
    };

    debug!(url = %url, "Opening store connection pool");
    pool_options
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        AppError::Config(format!(
            "Cannot create database directory {}: {}",
            dir.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool() {
        let pool = create_pool(&StoreConfig::in_memory()).await.unwrap();
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_create_pool_makes_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("jobs.db");
        let config = StoreConfig::new(format!("sqlite://{}", db.display()));

        create_pool(&config).await.unwrap();
        assert!(db.exists());
    }

    #[test]
    fn test_tilde_is_expanded_in_file_urls() {
        let url = StoreConfig::default().resolved_url();
        assert!(url.starts_with("sqlite://"));
        assert!(!url.contains('~'));
        assert!(url.ends_with(".taskmill/jobs.db"));
    }

    #[test]
    fn test_memory_urls_are_left_alone() {
        let config = StoreConfig::in_memory();
        assert!(config.is_in_memory());
        assert_eq!(config.resolved_url(), "sqlite::memory:");
    }
}
