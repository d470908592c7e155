//! User CRUD (§4.2).

use super::models::User;
use super::Store;
use crate::error::StoreError;
use sqlx::{Row, SqlitePool};

struct UserRow {
    id: i64,
    username: String,
    password_hash: Option<String>,
    admin: i64,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            username: r.username,
            password_hash: r.password_hash,
            admin: r.admin != 0,
        }
    }
}

async fn fetch_user_row(
    pool: &SqlitePool,
    row: sqlx::sqlite::SqliteRow,
) -> Result<UserRow, StoreError> {
    let _ = pool; // kept for symmetry with other fetch helpers
    Ok(UserRow {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        admin: row.try_get("admin")?,
    })
}

impl Store {
    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.with_read(|pool| async move {
            let rows = sqlx::query("SELECT id, username, password_hash, admin FROM users ORDER BY id")
                .fetch_all(&pool)
                .await?;
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                out.push(fetch_user_row(&pool, row).await?.into());
            }
            Ok(out)
        })
        .await
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.with_read(|pool| {
            let username = username.to_string();
            async move {
                let row = sqlx::query(
                    "SELECT id, username, password_hash, admin FROM users WHERE username = ?",
                )
                .bind(&username)
                .fetch_optional(&pool)
                .await?;
                match row {
                    Some(row) => Ok(Some(fetch_user_row(&pool, row).await?.into())),
                    None => Ok(None),
                }
            }
        })
        .await
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.with_read(|pool| async move {
            let row =
                sqlx::query("SELECT id, username, password_hash, admin FROM users WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&pool)
                    .await?;
            match row {
                Some(row) => Ok(Some(fetch_user_row(&pool, row).await?.into())),
                None => Ok(None),
            }
        })
        .await
    }

    /// Upsert by id: `id == 0` inserts and returns the record with its new id
    /// assigned; non-zero updates the row with that id (§4.2).
    pub async fn store_user(&self, mut user: User) -> Result<User, StoreError> {
        self.with_write(|pool| async move {
            if user.id == 0 {
                let existing: Option<(i64,)> =
                    sqlx::query_as("SELECT id FROM users WHERE username = ?")
                        .bind(&user.username)
                        .fetch_optional(&pool)
                        .await?;
                if existing.is_some() {
                    return Err(StoreError::Conflict(format!(
                        "username {:?} already exists",
                        user.username
                    )));
                }
                let result = sqlx::query(
                    "INSERT INTO users (username, password_hash, admin) VALUES (?, ?, ?)",
                )
                .bind(&user.username)
                .bind(&user.password_hash)
                .bind(user.admin as i64)
                .execute(&pool)
                .await?;
                user.id = result.last_insert_rowid();
            } else {
                sqlx::query(
                    "UPDATE users SET username = ?, password_hash = ?, admin = ? WHERE id = ?",
                )
                .bind(&user.username)
                .bind(&user.password_hash)
                .bind(user.admin as i64)
                .bind(user.id)
                .execute(&pool)
                .await
                .map_err(|e| match &e {
                    sqlx::Error::Database(dbe) if dbe.is_unique_violation() => {
                        StoreError::Conflict(format!(
                            "username {:?} already exists",
                            user.username
                        ))
                    }
                    _ => StoreError::Sqlx(e),
                })?;
            }
            Ok(user)
        })
        .await
    }

    /// Deletes dependent channels, then networks, then the user, in one
    /// transaction (§4.2).
    pub async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        self.with_write(|pool| async move {
            let mut tx = pool.begin().await?;
            sqlx::query(
                "DELETE FROM channels WHERE network_id IN (SELECT id FROM networks WHERE user_id = ?)",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM networks WHERE user_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(StoreError::NotFound { kind: "user", id });
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::memory_store;
    use super::*;
    use crate::db::models::{Channel, Network, SaslCredential};

    fn new_user(username: &str) -> User {
        User {
            id: 0,
            username: username.to_string(),
            password_hash: None,
            admin: false,
        }
    }

    #[tokio::test]
    async fn store_user_assigns_id_on_insert() {
        let store = memory_store().await;
        let stored = store.store_user(new_user("alice")).await.unwrap();
        assert_ne!(stored.id, 0);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_user_updates_by_id() {
        let store = memory_store().await;
        let mut stored = store.store_user(new_user("alice")).await.unwrap();
        stored.admin = true;
        store.store_user(stored.clone()).await.unwrap();

        let reloaded = store.get_user("alice").await.unwrap().unwrap();
        assert!(reloaded.admin);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let store = memory_store().await;
        store.store_user(new_user("alice")).await.unwrap();
        let err = store.store_user(new_user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_user_cascades() {
        let store = memory_store().await;
        let user = store.store_user(new_user("alice")).await.unwrap();
        let net = store
            .store_network(
                user.id,
                Network {
                    id: 0,
                    user_id: user.id,
                    name: None,
                    addr: "irc.example.org:6697".into(),
                    nick: "alice".into(),
                    username: "alice".into(),
                    realname: "Alice".into(),
                    pass: None,
                    connect_commands: vec![],
                    sasl: SaslCredential::None,
                },
            )
            .await
            .unwrap();
        store
            .store_channel(net.id, Channel::new(net.id, "#a".into()))
            .await
            .unwrap();

        store.delete_user(user.id).await.unwrap();
        assert!(store.list_networks(user.id).await.unwrap().is_empty());
        assert!(store.get_user("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_missing_user_is_not_found() {
        let store = memory_store().await;
        let err = store.delete_user(42).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "user", id: 42 }));
    }
}
