// sqlx::Error to AppError mapping
// (orphan rules keep a From impl out of the core crate)

use autopost_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // SQLite extended result codes: https://www.sqlite.org/rescode.html
            Some(code @ ("2067" | "1555")) => AppError::Conflict(format!(
                "Unique constraint violation: {} ({})",
                db_err.message(),
                code
            )),
            Some(code @ ("787" | "3850")) => AppError::Database(format!(
                "Foreign key constraint violation: {} ({})",
                db_err.message(),
                code
            )),
            Some("5") => AppError::Database(format!(
                "Database locked (SQLITE_BUSY): {}",
                db_err.message()
            )),
            Some("13") => AppError::Database(format!("Database full: {}", db_err.message())),
            Some(code) => AppError::Database(format!(
                "Database error [{}]: {}",
                code,
                db_err.message()
            )),
            None => AppError::Database(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

/// Decode a JSON column, naming the column on failure
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> Result<T, AppError> {
    serde_json::from_str(raw).map_err(|e| AppError::Database(format!("column {}: {}", column, e)))
}

/// Parse a stored enum label
pub(crate) fn decode_label<T>(column: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| AppError::Database(format!("column {}: {}", column, e)))
}
