#[cfg(test)]
pub mod models;
pub mod reconciler;

pub use reconciler::{Reconciler, Table};

/// Idempotent bootstrap, applied statement by statement.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tokens (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol               TEXT NOT NULL UNIQUE,
        name                 TEXT NOT NULL,
        latest_price         TEXT,
        price_change_percent TEXT,
        volume_24h           TEXT,
        total_volume         TEXT,
        start_time           TEXT,
        end_time             TEXT,
        created_at           TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_book_entries (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        token_id   INTEGER NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
        order_type TEXT NOT NULL CHECK (order_type IN ('BUY', 'SELL')),
        price      TEXT,
        quantity   TEXT,
        total      TEXT,
        crawled_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_order_book_token_crawled ON order_book_entries (token_id, crawled_at)",
];
