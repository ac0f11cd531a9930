use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

#[cfg(test)]
use crate::db::models::{OrderBookRow, TokenRow};
use crate::db::SCHEMA;
use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;
use crate::types::{OrderBookLevel, TokenRecord};

/// Rows written for one token in one run, all sharing `crawled_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub token_id: i64,
    pub crawled_at: DateTime<Utc>,
    pub rows: usize,
}

/// Maps scraped records onto persisted identities: tokens are upserted by
/// symbol, order books are appended as snapshots.
#[derive(Clone)]
pub struct Reconciler {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl Reconciler {
    /// Open (creating if needed) the SQLite file at `db_path` and bootstrap
    /// the schema.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
        let reconciler = Self::with_pool(pool, RetryPolicy::persistence());
        reconciler.ensure_schema().await?;
        info!("Database ready at {db_path}");
        Ok(reconciler)
    }

    pub fn with_pool(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn count(&self, table: Table) -> Result<i64> {
        let n = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table.name()))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Insert or update the token keyed by `symbol`, returning its id.
    /// `created_at` is only written on first insert.
    pub async fn upsert_token(&self, token: &TokenRecord) -> Result<i64> {
        let id = self
            .retry
            .run_if(&format!("token upsert for {}", token.symbol), AppError::is_persistence, || {
                self.upsert_token_once(token)
            })
            .await?;
        debug!(symbol = %token.symbol, token_id = id, "token reconciled");
        Ok(id)
    }

    async fn upsert_token_once(&self, token: &TokenRecord) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO tokens (
                symbol, name, latest_price, price_change_percent,
                volume_24h, total_volume, start_time, end_time, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                name = excluded.name,
                latest_price = excluded.latest_price,
                price_change_percent = excluded.price_change_percent,
                volume_24h = excluded.volume_24h,
                total_volume = excluded.total_volume,
                start_time = excluded.start_time,
                end_time = excluded.end_time
            RETURNING id
            "#,
        )
        .bind(&token.symbol)
        .bind(&token.name)
        .bind(decimal_text(token.latest_price))
        .bind(decimal_text(token.price_change_percent))
        .bind(decimal_text(token.volume_24h))
        .bind(decimal_text(token.total_volume))
        .bind(token.start_time)
        .bind(token.end_time)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Append `levels` as a new snapshot for `token_id`. Never deduplicates:
    /// two calls with the same input store two snapshots.
    pub async fn insert_snapshot(
        &self,
        token_id: i64,
        levels: &[OrderBookLevel],
        crawled_at: DateTime<Utc>,
    ) -> Result<Snapshot> {
        self.retry
            .run_if(&format!("order book insert for token {token_id}"), AppError::is_persistence, || {
                self.insert_snapshot_once(token_id, levels, crawled_at)
            })
            .await?;
        Ok(Snapshot { token_id, crawled_at, rows: levels.len() })
    }

    async fn insert_snapshot_once(
        &self,
        token_id: i64,
        levels: &[OrderBookLevel],
        crawled_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for level in levels {
            sqlx::query(
                r#"
                INSERT INTO order_book_entries (token_id, order_type, price, quantity, total, crawled_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token_id)
            .bind(level.side.as_str())
            .bind(decimal_text(level.price))
            .bind(decimal_text(level.quantity))
            .bind(decimal_text(level.total))
            .bind(crawled_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
impl Reconciler {
    pub async fn token_by_symbol(&self, symbol: &str) -> Result<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn order_book_entries(&self, token_id: i64) -> Result<Vec<OrderBookRow>> {
        let rows = sqlx::query_as::<_, OrderBookRow>(
            "SELECT * FROM order_book_entries WHERE token_id = ? ORDER BY id",
        )
        .bind(token_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Table {
    Tokens,
    OrderBookEntries,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::Tokens => "tokens",
            Table::OrderBookEntries => "order_book_entries",
        }
    }
}

fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.normalize().to_string())
}

#[cfg(test)]
pub(crate) async fn in_memory() -> Reconciler {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap().foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await.unwrap();
    let reconciler = Reconciler::with_pool(pool, RetryPolicy::new(2, vec![1]));
    reconciler.ensure_schema().await.unwrap();
    reconciler
}
