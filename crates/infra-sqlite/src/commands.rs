// Store commands as SQL against a single connection
//
// Callers own the transaction boundary: a command with several statements is
// only atomic when run inside BEGIN IMMEDIATE.

use sqlx::SqliteConnection;
use taskmill_core::domain::Record;
use taskmill_core::error::{AppError, Result};
use taskmill_core::port::{Command, Reply};

use crate::error::map_sqlx_error;

const TABLES: [&str; 4] = ["kv_hash", "kv_sorted", "kv_list", "kv_set"];

pub(crate) async fn apply(conn: &mut SqliteConnection, command: Command) -> Result<Reply> {
    match command {
        Command::Exists { key } => {
            let exists: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM kv_hash WHERE key = ?
                    UNION ALL SELECT 1 FROM kv_sorted WHERE key = ?
                    UNION ALL SELECT 1 FROM kv_list WHERE key = ?
                    UNION ALL SELECT 1 FROM kv_set WHERE key = ?
                )
                "#,
            )
            .bind(&key)
            .bind(&key)
            .bind(&key)
            .bind(&key)
            .fetch_one(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            Ok(Reply::Int(exists as i64))
        }

        Command::Delete { key } => {
            let mut removed = 0;
            for table in TABLES {
                let sql = format!("DELETE FROM {} WHERE key = ?", table);
                removed += sqlx::query(&sql)
                    .bind(&key)
                    .execute(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();
            }
            Ok(Reply::Int((removed > 0) as i64))
        }

        Command::HashGetAll { key } => hash_get_all(conn, &key).await.map(Reply::Record),

        Command::HashGet { key, field } => hash_get(conn, &key, &field).await.map(Reply::Value),

        Command::HashMultiGet { key, fields } => {
            let mut record = hash_get_all(conn, &key).await?;
            Ok(Reply::Values(
                fields.iter().map(|field| record.remove(field)).collect(),
            ))
        }

        Command::HashSet { key, fields } => {
            for (field, value) in &fields {
                hash_put(conn, &key, field, value).await?;
            }
            Ok(Reply::Ok)
        }

        Command::HashIncrBy { key, field, delta } => {
            let current = match hash_get(conn, &key, &field).await? {
                Some(raw) => raw.parse::<i64>().map_err(|_| {
                    AppError::Store(format!(
                        "hash value is not an integer: {}[{}] = {:?}",
                        key, field, raw
                    ))
                })?,
                None => 0,
            };
            let value = current.checked_add(delta).ok_or_else(|| {
                AppError::Store(format!("increment would overflow: {}[{}]", key, field))
            })?;
            hash_put(conn, &key, &field, &value.to_string()).await?;
            Ok(Reply::Int(value))
        }

        Command::SortedAdd { key, member } => {
            let added = sqlx::query("INSERT OR IGNORE INTO kv_sorted (key, member) VALUES (?, ?)")
                .bind(&key)
                .bind(&member)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
            Ok(Reply::Int(added as i64))
        }

        Command::SortedRemove { key, member } => {
            let removed = sqlx::query("DELETE FROM kv_sorted WHERE key = ? AND member = ?")
                .bind(&key)
                .bind(&member)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
            Ok(Reply::Int(removed as i64))
        }

        Command::SortedCard { key } => count(conn, "kv_sorted", &key).await.map(Reply::Int),

        Command::SortedRevRangeBelow { key, below, limit } => {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let members = match below {
                Some(below) => sqlx::query_scalar::<_, String>(
                    "SELECT member FROM kv_sorted WHERE key = ? AND member < ? ORDER BY member DESC LIMIT ?",
                )
                .bind(&key)
                .bind(below)
                .bind(limit)
                .fetch_all(&mut *conn)
                .await,
                None => sqlx::query_scalar::<_, String>(
                    "SELECT member FROM kv_sorted WHERE key = ? ORDER BY member DESC LIMIT ?",
                )
                .bind(&key)
                .bind(limit)
                .fetch_all(&mut *conn)
                .await,
            }
            .map_err(map_sqlx_error)?;
            Ok(Reply::Members(members))
        }

        Command::ListPushFront { key, value } => {
            sqlx::query(
                "INSERT INTO kv_list (key, seq, value) SELECT ?, COALESCE(MIN(seq), 0) - 1, ? FROM kv_list WHERE key = ?",
            )
            .bind(&key)
            .bind(&value)
            .bind(&key)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            count(conn, "kv_list", &key).await.map(Reply::Int)
        }

        Command::ListPopBack { key } => {
            let last: Option<(i64, String)> = sqlx::query_as(
                "SELECT seq, value FROM kv_list WHERE key = ? ORDER BY seq DESC LIMIT 1",
            )
            .bind(&key)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

            let Some((seq, value)) = last else {
                return Ok(Reply::Value(None));
            };
            sqlx::query("DELETE FROM kv_list WHERE key = ? AND seq = ?")
                .bind(&key)
                .bind(seq)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            Ok(Reply::Value(Some(value)))
        }

        Command::ListRemove { key, value, count } => {
            let count = i64::try_from(count).unwrap_or(i64::MAX);
            let removed = sqlx::query(
                r#"
                DELETE FROM kv_list
                WHERE key = ? AND seq IN (
                    SELECT seq FROM kv_list WHERE key = ? AND value = ? ORDER BY seq LIMIT ?
                )
                "#,
            )
            .bind(&key)
            .bind(&key)
            .bind(&value)
            .bind(count)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
            Ok(Reply::Int(removed as i64))
        }

        Command::ListLen { key } => count(conn, "kv_list", &key).await.map(Reply::Int),

        Command::SetAdd { key, member } => {
            let added = sqlx::query("INSERT OR IGNORE INTO kv_set (key, member) VALUES (?, ?)")
                .bind(&key)
                .bind(&member)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
            Ok(Reply::Int(added as i64))
        }

        Command::SetRemove { key, member } => {
            let removed = sqlx::query("DELETE FROM kv_set WHERE key = ? AND member = ?")
                .bind(&key)
                .bind(&member)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
            Ok(Reply::Int(removed as i64))
        }

        Command::SetMembers { key } => {
            let members: Vec<String> =
                sqlx::query_scalar("SELECT member FROM kv_set WHERE key = ? ORDER BY member")
                    .bind(&key)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)?;
            Ok(Reply::Members(members))
        }

        Command::SetCard { key } => count(conn, "kv_set", &key).await.map(Reply::Int),
    }
}

async fn hash_get_all(conn: &mut SqliteConnection, key: &str) -> Result<Record> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT field, value FROM kv_hash WHERE key = ?")
            .bind(key)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
    Ok(rows.into_iter().collect())
}

async fn hash_get(conn: &mut SqliteConnection, key: &str, field: &str) -> Result<Option<String>> {
    sqlx::query_scalar("SELECT value FROM kv_hash WHERE key = ? AND field = ?")
        .bind(key)
        .bind(field)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)
}

async fn hash_put(conn: &mut SqliteConnection, key: &str, field: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO kv_hash (key, field, value) VALUES (?, ?, ?)
        ON CONFLICT (key, field) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(field)
    .bind(value)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

async fn count(conn: &mut SqliteConnection, table: &str, key: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE key = ?", table);
    sqlx::query_scalar(&sql)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_error)
}
