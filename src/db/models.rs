//! Typed read-back of the two tables created by [`super::SCHEMA`]. Decimals
//! are stored as TEXT so no precision is lost to SQLite's REAL.

use chrono::{DateTime, NaiveDateTime, Utc};

#[derive(Debug, sqlx::FromRow)]
pub struct TokenRow {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub latest_price: Option<String>,
    pub price_change_percent: Option<String>,
    pub volume_24h: Option<String>,
    pub total_volume: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct OrderBookRow {
    pub id: i64,
    pub token_id: i64,
    pub order_type: String,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub total: Option<String>,
    pub crawled_at: DateTime<Utc>,
}
