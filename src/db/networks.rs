//! Network CRUD (§4.2).

use super::models::{Network, SaslCredential};
use super::Store;
use crate::error::StoreError;
use sqlx::{Row, SqlitePool};

fn row_to_network(row: sqlx::sqlite::SqliteRow) -> Result<Network, StoreError> {
    let mechanism: String = row.try_get("sasl_mechanism")?;
    let sasl = match mechanism.as_str() {
        "plain" => SaslCredential::Plain {
            username: row.try_get("sasl_plain_username")?,
            password: row.try_get("sasl_plain_password")?,
        },
        "external" => SaslCredential::External {
            cert_der: row.try_get("sasl_external_cert")?,
            key_der: row.try_get("sasl_external_key")?,
        },
        _ => SaslCredential::None,
    };

    let connect_commands_raw: Option<String> = row.try_get("connect_commands")?;
    let connect_commands = connect_commands_raw
        .map(|s| s.split("\r\n").map(str::to_string).collect())
        .unwrap_or_default();

    Ok(Network {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        addr: row.try_get("addr")?,
        nick: row.try_get("nick")?,
        username: row.try_get("username")?,
        realname: row.try_get("realname")?,
        pass: row.try_get("pass")?,
        connect_commands,
        sasl,
    })
}

const NETWORK_COLUMNS: &str = "id, user_id, name, addr, nick, username, realname, pass, \
     connect_commands, sasl_mechanism, sasl_plain_username, sasl_plain_password, \
     sasl_external_cert, sasl_external_key";

impl Store {
    pub async fn list_networks(&self, user_id: i64) -> Result<Vec<Network>, StoreError> {
        self.with_read(|pool: SqlitePool| async move {
            let rows = sqlx::query(&format!(
                "SELECT {NETWORK_COLUMNS} FROM networks WHERE user_id = ? ORDER BY id"
            ))
            .bind(user_id)
            .fetch_all(&pool)
            .await?;
            rows.into_iter().map(row_to_network).collect()
        })
        .await
    }

    pub async fn get_network(&self, id: i64) -> Result<Option<Network>, StoreError> {
        self.with_read(|pool| async move {
            let row = sqlx::query(&format!("SELECT {NETWORK_COLUMNS} FROM networks WHERE id = ?"))
                .bind(id)
                .fetch_optional(&pool)
                .await?;
            row.map(row_to_network).transpose()
        })
        .await
    }

    /// Upsert by id (§4.2). `ConnectCommands` is serialized as a CRLF-joined
    /// string; an empty list stores SQL NULL.
    pub async fn store_network(
        &self,
        user_id: i64,
        mut net: Network,
    ) -> Result<Network, StoreError> {
        net.user_id = user_id;
        self.with_write(|pool| async move {
            let (mechanism, plain_user, plain_pass, ext_cert, ext_key): (
                &str,
                Option<&str>,
                Option<&str>,
                Option<&[u8]>,
                Option<&[u8]>,
            ) = match &net.sasl {
                SaslCredential::None => ("none", None, None, None, None),
                SaslCredential::Plain { username, password } => {
                    ("plain", Some(username), Some(password), None, None)
                }
                SaslCredential::External { cert_der, key_der } => {
                    ("external", None, None, Some(cert_der), Some(key_der))
                }
            };
            let connect_commands = if net.connect_commands.is_empty() {
                None
            } else {
                Some(net.connect_commands.join("\r\n"))
            };

            if net.id == 0 {
                let result = sqlx::query(
                    "INSERT INTO networks (user_id, name, addr, nick, username, realname, pass, \
                     connect_commands, sasl_mechanism, sasl_plain_username, sasl_plain_password, \
                     sasl_external_cert, sasl_external_key) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(net.user_id)
                .bind(&net.name)
                .bind(&net.addr)
                .bind(&net.nick)
                .bind(&net.username)
                .bind(&net.realname)
                .bind(&net.pass)
                .bind(&connect_commands)
                .bind(mechanism)
                .bind(plain_user)
                .bind(plain_pass)
                .bind(ext_cert)
                .bind(ext_key)
                .execute(&pool)
                .await
                .map_err(map_unique_violation)?;
                net.id = result.last_insert_rowid();
            } else {
                sqlx::query(
                    "UPDATE networks SET name = ?, addr = ?, nick = ?, username = ?, \
                     realname = ?, pass = ?, connect_commands = ?, sasl_mechanism = ?, \
                     sasl_plain_username = ?, sasl_plain_password = ?, sasl_external_cert = ?, \
                     sasl_external_key = ? WHERE id = ?",
                )
                .bind(&net.name)
                .bind(&net.addr)
                .bind(&net.nick)
                .bind(&net.username)
                .bind(&net.realname)
                .bind(&net.pass)
                .bind(&connect_commands)
                .bind(mechanism)
                .bind(plain_user)
                .bind(plain_pass)
                .bind(ext_cert)
                .bind(ext_key)
                .bind(net.id)
                .execute(&pool)
                .await
                .map_err(map_unique_violation)?;
            }
            Ok(net)
        })
        .await
    }

    /// Deletes dependent channels, then the network, in one transaction.
    pub async fn delete_network(&self, id: i64) -> Result<(), StoreError> {
        self.with_write(|pool| async move {
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM channels WHERE network_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query("DELETE FROM networks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(StoreError::NotFound {
                    kind: "network",
                    id,
                });
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }
}

fn map_unique_violation(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(dbe) if dbe.is_unique_violation() => {
            StoreError::Conflict("network (user, addr, nick) or (user, name) already exists".into())
        }
        _ => StoreError::Sqlx(e),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::memory_store;
    use super::*;
    use crate::db::models::User;

    async fn new_user(store: &super::Store) -> User {
        store
            .store_user(User {
                id: 0,
                username: "alice".into(),
                password_hash: None,
                admin: false,
            })
            .await
            .unwrap()
    }

    fn bare_network(user_id: i64) -> Network {
        Network {
            id: 0,
            user_id,
            name: Some("libera".into()),
            addr: "irc.libera.chat:6697".into(),
            nick: "alice".into(),
            username: "alice".into(),
            realname: "Alice".into(),
            pass: None,
            connect_commands: vec![],
            sasl: SaslCredential::None,
        }
    }

    #[tokio::test]
    async fn round_trip_preserves_fields_modulo_id() {
        let store = memory_store().await;
        let user = new_user(&store).await;
        let mut net = bare_network(user.id);
        net.connect_commands = vec!["MODE {nick} +x".into(), "JOIN #rust".into()];
        net.sasl = SaslCredential::Plain {
            username: "alice".into(),
            password: "hunter2".into(),
        };

        let stored = store.store_network(user.id, net.clone()).await.unwrap();
        let listed = store.list_networks(user.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].connect_commands, net.connect_commands);
        assert_eq!(listed[0].sasl, net.sasl);
        assert_eq!(listed[0].id, stored.id);
        assert_ne!(stored.id, 0);
    }

    #[tokio::test]
    async fn empty_connect_commands_round_trip_as_empty() {
        let store = memory_store().await;
        let user = new_user(&store).await;
        let net = bare_network(user.id);
        let stored = store.store_network(user.id, net).await.unwrap();
        let fetched = store.get_network(stored.id).await.unwrap().unwrap();
        assert!(fetched.connect_commands.is_empty());
    }

    #[tokio::test]
    async fn duplicate_addr_nick_is_conflict() {
        let store = memory_store().await;
        let user = new_user(&store).await;
        store
            .store_network(user.id, bare_network(user.id))
            .await
            .unwrap();
        let mut dup = bare_network(user.id);
        dup.name = Some("libera-2".into());
        let err = store.store_network(user.id, dup).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn sasl_plain_then_external_clears_plain_fields() {
        let store = memory_store().await;
        let user = new_user(&store).await;
        let mut net = bare_network(user.id);
        net.sasl = SaslCredential::Plain {
            username: "a".into(),
            password: "b".into(),
        };
        let stored = store.store_network(user.id, net).await.unwrap();

        let mut updated = stored.clone();
        updated.sasl = SaslCredential::External {
            cert_der: vec![1, 2, 3],
            key_der: vec![4, 5, 6],
        };
        store.store_network(user.id, updated).await.unwrap();

        let fetched = store.get_network(stored.id).await.unwrap().unwrap();
        assert_eq!(
            fetched.sasl,
            SaslCredential::External {
                cert_der: vec![1, 2, 3],
                key_der: vec![4, 5, 6],
            }
        );
    }
}
