//! Channel CRUD (§4.2).

use super::models::{Channel, MessageFilter};
use super::Store;
use crate::error::StoreError;
use sqlx::{Row, SqlitePool};
use std::time::Duration;

const CHANNEL_COLUMNS: &str =
    "id, network_id, name, key, detached, relay_detached, reattach_on, detach_after, detach_on";

fn row_to_channel(row: sqlx::sqlite::SqliteRow) -> Result<Channel, StoreError> {
    let detached: i64 = row.try_get("detached")?;
    let relay_detached: String = row.try_get("relay_detached")?;
    let reattach_on: String = row.try_get("reattach_on")?;
    let detach_on: String = row.try_get("detach_on")?;
    let detach_after: i64 = row.try_get("detach_after")?;

    Ok(Channel {
        id: row.try_get("id")?,
        network_id: row.try_get("network_id")?,
        name: row.try_get("name")?,
        key: row.try_get("key")?,
        detached: detached != 0,
        relay_detached: MessageFilter::parse(&relay_detached),
        reattach_on: MessageFilter::parse(&reattach_on),
        detach_after: Duration::from_secs(detach_after.max(0) as u64),
        detach_on: MessageFilter::parse(&detach_on),
    })
}

impl Store {
    pub async fn list_channels(&self, network_id: i64) -> Result<Vec<Channel>, StoreError> {
        self.with_read(|pool: SqlitePool| async move {
            let rows = sqlx::query(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE network_id = ? ORDER BY id"
            ))
            .bind(network_id)
            .fetch_all(&pool)
            .await?;
            rows.into_iter().map(row_to_channel).collect()
        })
        .await
    }

    pub async fn get_channel(&self, id: i64) -> Result<Option<Channel>, StoreError> {
        self.with_read(|pool| async move {
            let row = sqlx::query(&format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?"))
                .bind(id)
                .fetch_optional(&pool)
                .await?;
            row.map(row_to_channel).transpose()
        })
        .await
    }

    /// Upsert by id (§4.2). `DetachAfter` is stored as whole seconds, rounded
    /// up so a sub-second duration never collapses to "disabled".
    pub async fn store_channel(
        &self,
        network_id: i64,
        mut chan: Channel,
    ) -> Result<Channel, StoreError> {
        chan.network_id = network_id;
        self.with_write(|pool| async move {
            let detach_after_secs = detach_after_to_secs(chan.detach_after);

            if chan.id == 0 {
                let result = sqlx::query(
                    "INSERT INTO channels (network_id, name, key, detached, relay_detached, \
                     reattach_on, detach_after, detach_on) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(chan.network_id)
                .bind(&chan.name)
                .bind(&chan.key)
                .bind(chan.detached as i64)
                .bind(chan.relay_detached.as_str())
                .bind(chan.reattach_on.as_str())
                .bind(detach_after_secs)
                .bind(chan.detach_on.as_str())
                .execute(&pool)
                .await
                .map_err(map_unique_violation)?;
                chan.id = result.last_insert_rowid();
            } else {
                sqlx::query(
                    "UPDATE channels SET name = ?, key = ?, detached = ?, relay_detached = ?, \
                     reattach_on = ?, detach_after = ?, detach_on = ? WHERE id = ?",
                )
                .bind(&chan.name)
                .bind(&chan.key)
                .bind(chan.detached as i64)
                .bind(chan.relay_detached.as_str())
                .bind(chan.reattach_on.as_str())
                .bind(detach_after_secs)
                .bind(chan.detach_on.as_str())
                .bind(chan.id)
                .execute(&pool)
                .await
                .map_err(map_unique_violation)?;
            }
            Ok(chan)
        })
        .await
    }

    pub async fn delete_channel(&self, id: i64) -> Result<(), StoreError> {
        self.with_write(|pool| async move {
            let result = sqlx::query("DELETE FROM channels WHERE id = ?")
                .bind(id)
                .execute(&pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound {
                    kind: "channel",
                    id,
                });
            }
            Ok(())
        })
        .await
    }
}

fn detach_after_to_secs(d: Duration) -> i64 {
    let secs = d.as_secs();
    let rounded = if d.subsec_nanos() > 0 { secs + 1 } else { secs };
    rounded as i64
}

fn map_unique_violation(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(dbe) if dbe.is_unique_violation() => {
            StoreError::Conflict("channel already exists on this network".into())
        }
        _ => StoreError::Sqlx(e),
    }
}
