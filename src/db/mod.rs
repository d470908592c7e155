//! Persistence store (C2, §4.2).
//!
//! Wraps a single `sqlx::SqlitePool` with an explicit `tokio::sync::RwLock<()>`
//! so the shared/exclusive contract the spec requires is visible at the type
//! level rather than left to SQLite's own locking (see DESIGN.md open
//! question #2). Reads take the read guard; writes and schema upgrade take
//! the write guard and never release it mid-transaction.

mod channels;
mod migrations;
mod models;
mod networks;
mod users;

pub use models::{Channel, MessageFilter, Network, SaslCredential, User};

use crate::error::StoreError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// Timeout applied to every store operation (§5).
const STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Durable CRUD handle over users, networks, and channels.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    /// `()` guard enforcing the shared/exclusive contract described above.
    lock: std::sync::Arc<RwLock<()>>,
}

impl Store {
    /// Open (and migrate) a SQLite-backed store at `path`, or `:memory:`.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let options = if path == ":memory:" {
            SqliteConnectOptions::new()
                .filename("file::memory:")
                .shared_cache(true)
                .create_if_missing(true)
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Conflict(format!(
                            "failed to create store directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };

        // A single connection makes the RwLock<()> above a real exclusive
        // writer lock rather than cosmetic: sqlx can never hand out a second
        // connection to race a write against.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        migrations::upgrade(&pool).await?;
        info!(path = %path, "store opened");

        Ok(Self {
            pool,
            lock: std::sync::Arc::new(RwLock::new(())),
        })
    }

    async fn with_read<F, Fut, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let _guard = tokio::time::timeout(STORE_TIMEOUT, self.lock.read())
            .await
            .map_err(|_| StoreError::Timeout)?;
        f(self.pool.clone()).await
    }

    async fn with_write<F, Fut, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let _guard = tokio::time::timeout(STORE_TIMEOUT, self.lock.write())
            .await
            .map_err(|_| StoreError::Timeout)?;
        f(self.pool.clone()).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub async fn memory_store() -> Store {
        Store::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn open_runs_migrations() {
        let store = memory_store().await;
        assert!(store.list_users().await.unwrap().is_empty());
    }
}
