use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub const BOTH: [OrderSide; 2] = [OrderSide::Sell, OrderSide::Buy];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// The side a taker trades against: a "buy" button fills resting sells.
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scraped (raw) records: text exactly as displayed
// ---------------------------------------------------------------------------

/// One token card from the listing page. Every field except `symbol` and
/// `name` may be missing from the card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawToken {
    pub symbol: String,
    pub name: String,
    pub latest_price: Option<String>,
    pub price_change_percent: Option<String>,
    pub volume_24h: Option<String>,
    pub total_volume: Option<String>,
    pub start_time: Option<String>,
    /// Second timestamp on the card, or the status label shown instead of it.
    pub end_time: Option<String>,
}

/// One visible row of an order-book table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOrderBookRow {
    pub side: OrderSide,
    pub price: String,
    pub quantity: String,
    pub total: String,
}

// ---------------------------------------------------------------------------
// Normalized records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub symbol: String,
    pub name: String,
    pub latest_price: Option<Decimal>,
    pub price_change_percent: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub total_volume: Option<Decimal>,
    pub start_time: Option<NaiveDateTime>,
    /// `None` while the exchange shows "pending confirmation".
    pub end_time: Option<NaiveDateTime>,
}

/// One price level. `total` is the displayed value, never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub side: OrderSide,
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub total: Option<Decimal>,
}
