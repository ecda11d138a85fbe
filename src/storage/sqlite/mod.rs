//! SQLite implementations of storage interfaces.

mod binder_store;
mod channel_store;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use backon::Retryable;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

pub use binder_store::{SqliteBinder, SqliteBinderStore};
pub use channel_store::SqliteChannelStore;

use super::{Result, StorageError};
use crate::config::SqliteConfig;
use crate::utils::retry::{is_retryable_connect_error, storage_backoff};

/// Open a connection pool for the configured database.
///
/// In-memory databases live exactly as long as their single connection, so
/// the pool is pinned to one connection that is never recycled.
pub async fn connect(config: &SqliteConfig) -> Result<SqlitePool> {
    let (options, pool_options) = match &config.path {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::Backend(e.to_string()))?;
                }
            }
            let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_millis(config.busy_timeout_ms));
            let pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
            (options, pool_options)
        }
        None => {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?
                .busy_timeout(Duration::from_millis(config.busy_timeout_ms));
            let pool_options = SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
            (options, pool_options)
        }
    };

    let pool = (|| async {
        pool_options
            .clone()
            .connect_with(options.clone())
            .await
    })
    .retry(storage_backoff())
    .when(is_retryable_connect_error)
    .notify(|err: &sqlx::Error, delay: Duration| {
        warn!(error = %err, ?delay, "SQLite connection failed, retrying");
    })
    .await?;

    info!(
        path = config.path.as_deref().unwrap_or(":memory:"),
        "SQLite storage connected"
    );

    Ok(pool)
}

/// Parse a stored RFC3339 timestamp.
fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{}: {}", value, e)))
}
