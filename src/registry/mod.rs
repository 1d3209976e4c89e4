//! Device registry: AOR → device-token registrations in external storage.

use crate::{Aor, DeviceToken, Error, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::info;

/// Narrow consumed interface to the registration store.
///
/// Reconnect-on-failure is the caller's responsibility; the store never
/// retries internally.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Look up the device token registered for an AOR.
    async fn find_token(&self, aor: &Aor) -> Result<Option<DeviceToken>>;

    /// Create or refresh a registration, recording the Call-ID that
    /// carried it.
    async fn upsert(&self, aor: &Aor, token: &DeviceToken, call_id: &str) -> Result<()>;

    /// Remove every registration carrying the token. Idempotent; returns
    /// the number of rows removed.
    async fn delete(&self, token: &DeviceToken) -> Result<u64>;

    /// Liveness probe against the backing store.
    async fn check_connection(&self) -> Result<()>;
}

/// SQLite-backed registration store.
///
/// One table keyed by `(aor, token)`: an AOR may register several
/// devices, and feedback-driven deletion is keyed by token alone.
#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: Pool<Sqlite>,
    table: String,
}

impl SqliteTokenStore {
    /// Open (or create) the store at the given connection descriptor,
    /// e.g. `sqlite:push.db?mode=rwc`.
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::Storage(format!("bad storage descriptor: {}", e)))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("storage connect failed: {}", e)))?;

        let store = Self::with_pool(pool, table)?;
        info!(table = %store.table, "device registry opened");
        Ok(store)
    }

    /// In-memory store (for testing).
    pub async fn connect_in_memory(table: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Self::with_pool(pool, table)
    }

    fn with_pool(pool: Pool<Sqlite>, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(SqliteTokenStore {
            pool,
            table: table.to_string(),
        })
    }

    /// Create the registration table when absent.
    pub async fn init_schema(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                aor TEXT NOT NULL,
                token TEXT NOT NULL,
                call_id TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (aor, token)
            )",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenStore for SqliteTokenStore {
    async fn find_token(&self, aor: &Aor) -> Result<Option<DeviceToken>> {
        let sql = format!(
            "SELECT token FROM {} WHERE aor = ? ORDER BY recorded_at DESC LIMIT 1",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(aor.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let hex: String = row.try_get(0)?;
                let token = DeviceToken::from_hex(&hex)
                    .map_err(|e| Error::Storage(format!("corrupt stored token: {}", e)))?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, aor: &Aor, token: &DeviceToken, call_id: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (aor, token, call_id, recorded_at) VALUES (?, ?, ?, ?)
             ON CONFLICT (aor, token)
             DO UPDATE SET call_id = excluded.call_id, recorded_at = excluded.recorded_at",
            self.table
        );
        sqlx::query(&sql)
            .bind(aor.as_str())
            .bind(token.to_hex())
            .bind(call_id)
            .bind(unix_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, token: &DeviceToken) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE token = ?", self.table);
        let result = sqlx::query(&sql)
            .bind(token.to_hex())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn check_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// The table name cannot be bound as a query parameter, so it is
// restricted to identifier characters before interpolation.
fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Storage(format!("invalid table name: {:?}", table)))
    }
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
