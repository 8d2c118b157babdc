use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};

/// How long a symbol stays tracked after its last sighting.
pub const DEFAULT_RETENTION_DAYS: i64 = 3;

/// A currently tracked symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRecord {
    pub symbol: String,
    pub delete_at: DateTime<Utc>,
}

/// Storage operations the processing loop depends on.
#[async_trait]
pub trait TickerRepository: Send + Sync {
    /// Insert or refresh `symbol`; returns the new expiry.
    async fn upsert(&self, symbol: &str) -> StoreResult<DateTime<Utc>>;

    /// Delete expired symbols; returns how many were removed.
    async fn sweep(&self) -> StoreResult<u64>;
}

#[derive(Clone)]
pub struct TickerStore {
    pool: SqlitePool,
    retention: Duration,
}

impl TickerStore {
    /// Open (creating if missing) the database at `database_url`.
    pub async fn connect(database_url: &str, retention: Duration) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // One long-lived connection: writers are serialized and `sqlite::memory:`
        // databases survive for the life of the store.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool, retention };
        store.init_schema().await?;

        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tickers (
                ticker TEXT PRIMARY KEY,
                delete_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickers_delete_at ON tickers(delete_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Upsert as of `now`. Auto-committed before returning.
    pub async fn upsert_at(&self, symbol: &str, now: DateTime<Utc>) -> StoreResult<DateTime<Utc>> {
        // Stored at microsecond precision; return exactly what was written.
        let delete_at = (now + self.retention).trunc_subsecs(6);

        sqlx::query("INSERT OR REPLACE INTO tickers (ticker, delete_at) VALUES (?, ?)")
            .bind(symbol)
            .bind(format_timestamp(delete_at))
            .execute(&self.pool)
            .await?;

        tracing::info!(
            "Upserted ticker: {}. Deletion set for {}.",
            symbol,
            delete_at.format("%Y-%m-%d")
        );
        Ok(delete_at)
    }

    /// Remove every symbol whose expiry is strictly before `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM tickers WHERE delete_at < ?")
            .bind(format_timestamp(now))
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!("Database cleanup: removed {} expired ticker(s)", removed);
        }
        Ok(removed)
    }

    pub async fn get(&self, symbol: &str) -> StoreResult<Option<TickerRecord>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT ticker, delete_at FROM tickers WHERE ticker = ?")
                .bind(symbol)
                .fetch_optional(&self.pool)
                .await?;

        row.map(into_record).transpose()
    }

    /// All tracked symbols, soonest expiry first.
    pub async fn list(&self) -> StoreResult<Vec<TickerRecord>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT ticker, delete_at FROM tickers ORDER BY delete_at, ticker")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(into_record).collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn count(&self) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tickers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl TickerRepository for TickerStore {
    async fn upsert(&self, symbol: &str) -> StoreResult<DateTime<Utc>> {
        self.upsert_at(symbol, Utc::now()).await
    }

    async fn sweep(&self) -> StoreResult<u64> {
        self.sweep_at(Utc::now()).await
    }
}

/// Fixed-width UTC text so that string order in SQL matches time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn into_record((symbol, delete_at): (String, String)) -> StoreResult<TickerRecord> {
    let delete_at = DateTime::parse_from_rfc3339(&delete_at)
        .map_err(|e| StoreError::Corrupt {
            symbol: symbol.clone(),
            reason: e.to_string(),
        })?
        .with_timezone(&Utc);
    Ok(TickerRecord { symbol, delete_at })
}
