use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use twoqr_types::{KeyDetails, KeyRecord, ServerRecord, StoreError};

use super::CredentialStore;

const CREATE_SERVERS: &str = "CREATE TABLE IF NOT EXISTS servers (
    app_id TEXT PRIMARY KEY NOT NULL,
    app_url TEXT NOT NULL,
    app_name TEXT NOT NULL
)";

const CREATE_KEYS: &str = "CREATE TABLE IF NOT EXISTS keys (
    key_id TEXT PRIMARY KEY NOT NULL,
    app_id TEXT NOT NULL REFERENCES servers (app_id),
    user_id TEXT NOT NULL,
    counter INTEGER NOT NULL,
    last_used TEXT NOT NULL,
    UNIQUE (app_id, user_id)
)";

fn database(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn counter_from_row(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("counter {value} out of range")))
}

fn server_from_row(row: &SqliteRow) -> Result<ServerRecord, StoreError> {
    Ok(ServerRecord {
        app_id: row.try_get("app_id").map_err(database)?,
        app_name: row.try_get("app_name").map_err(database)?,
        app_url: row.try_get("app_url").map_err(database)?,
    })
}

fn key_from_row(row: &SqliteRow) -> Result<KeyRecord, StoreError> {
    Ok(KeyRecord {
        key_id: row.try_get("key_id").map_err(database)?,
        app_id: row.try_get("app_id").map_err(database)?,
        user_id: row.try_get("user_id").map_err(database)?,
        counter: counter_from_row(row.try_get("counter").map_err(database)?)?,
        last_used: row.try_get("last_used").map_err(database)?,
    })
}

/// A [`CredentialStore`] backed by SQLite through a `sqlx` pool.
///
/// All statements are parameterized. Multi-step mutations run in a transaction.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url`, e.g. `sqlite://registry.db?mode=rwc`, and create the tables if needed.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(url).await.map_err(database)?;
        Self::from_pool(pool).await
    }

    /// A private in-memory database, useful for tests.
    ///
    /// The pool is limited to one connection since every SQLite connection opens its own
    /// in-memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(database)?;
        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the tables if needed.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_SERVERS)
            .execute(&pool)
            .await
            .map_err(database)?;
        sqlx::query(CREATE_KEYS)
            .execute(&pool)
            .await
            .map_err(database)?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl CredentialStore for SqliteStore {
    async fn get_server(&self, app_id: &str) -> Result<Option<ServerRecord>, StoreError> {
        sqlx::query("SELECT app_id, app_name, app_url FROM servers WHERE app_id = ?")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?
            .as_ref()
            .map(server_from_row)
            .transpose()
    }

    async fn has_server(&self, app_id: &str) -> Result<bool, StoreError> {
        Ok(self.get_server(app_id).await?.is_some())
    }

    async fn has_key(&self, key_id: &str) -> Result<bool, StoreError> {
        Ok(self.get_key(key_id).await?.is_some())
    }

    async fn get_key(&self, key_id: &str) -> Result<Option<KeyRecord>, StoreError> {
        sqlx::query(
            "SELECT key_id, app_id, user_id, counter, last_used FROM keys WHERE key_id = ?",
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?
        .as_ref()
        .map(key_from_row)
        .transpose()
    }

    async fn is_user_already_registered(
        &self,
        user_id: &str,
        app_id: &str,
    ) -> Result<bool, StoreError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM keys WHERE user_id = ? AND app_id = ?")
                .bind(user_id)
                .bind(app_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(database)?;
        Ok(found.is_some())
    }

    async fn get_counter(&self, key_id: &str) -> Result<u32, StoreError> {
        let counter: Option<i64> = sqlx::query_scalar("SELECT counter FROM keys WHERE key_id = ?")
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;
        counter_from_row(counter.ok_or(StoreError::UnknownCredential)?)
    }

    async fn list_keys(&self) -> Result<Vec<KeyDetails>, StoreError> {
        let rows = sqlx::query(
            "SELECT k.key_id, k.user_id, k.counter, k.last_used, s.app_name, s.app_url \
             FROM keys k JOIN servers s ON s.app_id = k.app_id \
             ORDER BY k.last_used DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(database)?;

        rows.iter()
            .map(|row| {
                Ok(KeyDetails {
                    key_id: row.try_get("key_id").map_err(database)?,
                    user_id: row.try_get("user_id").map_err(database)?,
                    app_name: row.try_get("app_name").map_err(database)?,
                    app_url: row.try_get("app_url").map_err(database)?,
                    counter: counter_from_row(row.try_get("counter").map_err(database)?)?,
                    last_used: row.try_get::<DateTime<Utc>, _>("last_used").map_err(database)?,
                })
            })
            .collect()
    }

    async fn insert_server(&mut self, server: ServerRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO servers (app_id, app_url, app_name) VALUES (?, ?, ?) \
             ON CONFLICT (app_id) DO NOTHING",
        )
        .bind(&server.app_id)
        .bind(&server.app_url)
        .bind(&server.app_name)
        .execute(&self.pool)
        .await
        .map_err(database)?;
        Ok(())
    }

    async fn insert_key(&mut self, key: KeyRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(database)?;

        let server: Option<i64> = sqlx::query_scalar("SELECT 1 FROM servers WHERE app_id = ?")
            .bind(&key.app_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(database)?;
        if server.is_none() {
            return Err(StoreError::UnknownServer);
        }

        let user: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM keys WHERE user_id = ? AND app_id = ?")
                .bind(&key.user_id)
                .bind(&key.app_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(database)?;
        if user.is_some() {
            return Err(StoreError::DuplicateUser);
        }

        let existing: Option<i64> = sqlx::query_scalar("SELECT 1 FROM keys WHERE key_id = ?")
            .bind(&key.key_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(database)?;
        if existing.is_some() {
            return Err(StoreError::DuplicateKey);
        }

        sqlx::query(
            "INSERT INTO keys (key_id, app_id, user_id, counter, last_used) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&key.key_id)
        .bind(&key.app_id)
        .bind(&key.user_id)
        .bind(i64::from(key.counter))
        .bind(key.last_used)
        .execute(&mut *tx)
        .await
        .map_err(database)?;

        tx.commit().await.map_err(database)
    }

    async fn set_counter(&mut self, key_id: &str, value: u32) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(database)?;

        // the comparison lives in the statement so check and write cannot interleave
        let updated = sqlx::query(
            "UPDATE keys SET counter = ?, last_used = ? WHERE key_id = ? AND counter <= ?",
        )
        .bind(i64::from(value))
        .bind(Utc::now())
        .bind(key_id)
        .bind(i64::from(value))
        .execute(&mut *tx)
        .await
        .map_err(database)?
        .rows_affected();

        if updated == 0 {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT counter FROM keys WHERE key_id = ?")
                    .bind(key_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(database)?;
            return Err(match current {
                Some(current) => StoreError::CounterRegression {
                    current: counter_from_row(current)?,
                    requested: value,
                },
                None => StoreError::UnknownCredential,
            });
        }

        tx.commit().await.map_err(database)
    }

    async fn clear(&mut self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(database)?;
        sqlx::query("DELETE FROM keys")
            .execute(&mut *tx)
            .await
            .map_err(database)?;
        sqlx::query("DELETE FROM servers")
            .execute(&mut *tx)
            .await
            .map_err(database)?;
        tx.commit().await.map_err(database)
    }
}
