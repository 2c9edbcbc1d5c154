use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageDetails {
    pub version: String,
    pub pool_stats: String,
}

/// Narrow capability over the durable backend. The server only pings,
/// migrates, and reports; schemas belong to the backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn ping(&self) -> Result<(), StorageError>;

    async fn migrate(&self) -> Result<(), StorageError>;

    async fn pending_migrations(&self) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }

    async fn storage_details(&self) -> Result<Option<StorageDetails>, StorageError> {
        Ok(None)
    }

    fn backend_type(&self) -> &'static str;
}

/// No-op backend for servers running without durable storage.
#[derive(Debug, Default)]
pub struct MemoryBackend;

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

const SCHEMA_VERSION: i64 = 1;

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        Ok(f(&conn)?)
    }

    fn applied_version(conn: &Connection) -> Result<i64, rusqlite::Error> {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn ping(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )?;
            let applied = Self::applied_version(conn)?;
            if applied < SCHEMA_VERSION {
                conn.execute(
                    "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
                    [SCHEMA_VERSION],
                )?;
            }
            Ok(())
        })
    }

    async fn pending_migrations(&self) -> Result<Vec<String>, StorageError> {
        let applied = self.with_conn(|conn| {
            let has_table: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
                [],
                |row| row.get(0),
            )?;
            if has_table == 0 {
                return Ok(0);
            }
            Self::applied_version(conn)
        })?;
        let pending = (applied + 1..=SCHEMA_VERSION)
            .map(|v| format!("migration-{:03}", v))
            .collect();
        Ok(pending)
    }

    async fn storage_details(&self) -> Result<Option<StorageDetails>, StorageError> {
        let version: String =
            self.with_conn(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get(0)))?;
        Ok(Some(StorageDetails {
            version: format!("sqlite {}", version),
            pool_stats: "single-connection".to_string(),
        }))
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sqlite_migrate_then_ping() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        assert_eq!(
            backend.pending_migrations().await.expect("pending").len(),
            1
        );
        backend.migrate().await.expect("migrate");
        backend.ping().await.expect("ping");
        assert!(backend.pending_migrations().await.expect("pending").is_empty());
        let details = backend.storage_details().await.expect("details");
        assert!(details.expect("some").version.starts_with("sqlite"));
    }

    #[tokio::test]
    async fn memory_backend_is_always_healthy() {
        let backend = MemoryBackend;
        backend.ping().await.expect("ping");
        backend.migrate().await.expect("migrate");
        assert_eq!(backend.backend_type(), "memory");
    }
}
