//! Database access layer

use sqlx::SqlitePool;
use tracing::warn;

use crate::Result;

pub mod init;
pub mod models;

pub use init::init_database;

/// Read an integer setting, falling back to the default when the key is
/// missing or its value does not parse
pub async fn get_setting_i64(db: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    Ok(match value {
        Some(text) => text.parse::<i64>().unwrap_or_else(|_| {
            warn!("Setting '{}' has non-integer value '{}', using default {}", key, text, default);
            default
        }),
        None => default,
    })
}
