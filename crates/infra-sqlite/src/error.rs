// sqlx::Error -> AppError
//
// Lives here because of the orphan rule: core cannot depend on sqlx.

use taskmill_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            Some(code) => match code.as_ref() {
                "5" | "517" => {
                    AppError::Store(format!("Store busy (SQLITE_BUSY): {}", db_err.message()))
                }
                "6" => AppError::Store(format!("Store locked (SQLITE_LOCKED): {}", db_err.message())),
                "13" => AppError::Store(format!("Store full: {}", db_err.message())),
                "2067" | "1555" => AppError::Store(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                other => AppError::Store(format!("Store error [{}]: {}", other, db_err.message())),
            },
            None => AppError::Store(format!("Store error: {}", db_err.message())),
        },
        sqlx::Error::PoolTimedOut => {
            AppError::Store("Timed out waiting for a store connection".to_string())
        }
        sqlx::Error::ColumnNotFound(col) => AppError::Store(format!("Column not found: {}", col)),
        _ => AppError::Store(err.to_string()),
    }
}
