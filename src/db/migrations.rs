//! Schema versioning and forward migration (§4.2).
//!
//! Migrations are opaque SQL blobs applied in order. The stored version is
//! the number of migrations applied so far, tracked via `PRAGMA user_version`
//! (§6: "a `PRAGMA user_version` equivalent carrying the schema version").

use crate::error::StoreError;
use sqlx::SqlitePool;
use tracing::info;

/// Ordered list of migrations. Index 0 is "version 1".
const MIGRATIONS: &[&str] = &[include_str!("../../migrations/001_init.sql")];

/// Number of migrations this build knows how to apply.
pub fn migration_count() -> i64 {
    MIGRATIONS.len() as i64
}

async fn read_version(pool: &SqlitePool) -> Result<i64, StoreError> {
    let row: (i64,) = sqlx::query_as("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

async fn write_version(pool: &SqlitePool, version: i64) -> Result<(), StoreError> {
    // PRAGMA does not support bind parameters; the value is our own i64, not
    // user input, so formatting it directly is safe.
    sqlx::query(&format!("PRAGMA user_version = {version}"))
        .execute(pool)
        .await?;
    Ok(())
}

/// Apply migrations V..N, where V is the stored version and N is
/// [`migration_count`]. No-op if already current. Fails `SchemaTooNew` if the
/// stored version exceeds what this build supports (§3 invariant 4).
pub async fn upgrade(pool: &SqlitePool) -> Result<(), StoreError> {
    let stored = read_version(pool).await?;
    let supported = migration_count();

    if stored == supported {
        return Ok(());
    }
    if stored > supported {
        return Err(StoreError::SchemaTooNew {
            stored,
            supported,
        });
    }

    let mut tx = pool.begin().await?;
    for (idx, migration) in MIGRATIONS.iter().enumerate().skip(stored as usize) {
        for statement in split_statements(migration) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::MigrationFailed(idx as u32 + 1, e.to_string()))?;
        }
    }
    tx.commit().await?;

    write_version(pool, supported).await?;
    info!(from = stored, to = supported, "applied schema migrations");
    Ok(())
}

/// Split a migration blob into individual statements, skipping comments and
/// blank lines (mirrors the grounding codebase's migration runner).
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .filter_map(|stmt| {
            let trimmed: String = stmt
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        })
        .collect()
}
