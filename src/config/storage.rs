//! Storage configuration types.

use serde::Deserialize;

/// Default SQLite pool size for file-backed databases.
pub const DEFAULT_SQLITE_MAX_CONNECTIONS: u32 = 5;

/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    /// Process-local, nothing survives a restart.
    Memory,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path. `None` uses a private in-memory database.
    pub path: Option<String>,
    /// Pool size. Forced to 1 for in-memory databases.
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: DEFAULT_SQLITE_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_SQLITE_BUSY_TIMEOUT_MS,
        }
    }
}

impl SqliteConfig {
    /// Configuration for a file-backed database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Configuration for a private in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let storage = StorageConfig::default();
        assert_eq!(storage.storage_type, StorageType::Sqlite);
        assert!(storage.sqlite.path.is_none());
        assert_eq!(storage.sqlite.max_connections, DEFAULT_SQLITE_MAX_CONNECTIONS);
    }

    #[test]
    fn test_sqlite_file_config() {
        let config = SqliteConfig::file("/tmp/ledgerline.db");
        assert_eq!(config.path.as_deref(), Some("/tmp/ledgerline.db"));
        assert_eq!(config.busy_timeout_ms, DEFAULT_SQLITE_BUSY_TIMEOUT_MS);
    }
}
