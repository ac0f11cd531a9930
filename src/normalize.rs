//! Scraped text → typed values.
//!
//! Nothing here fails on malformed numbers or dates: they collapse to
//! [`Normalized::Unknown`] and are logged. Only the order side and the symbol
//! (the reconciliation key) surface errors to the caller.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::types::{OrderBookLevel, OrderSide, RawOrderBookRow, RawToken, TokenRecord};

/// End-time label shown until the exchange confirms a launch date.
pub const PENDING_CONFIRMATION: &str = "Đợi xác nhận";

/// Status labels that may replace the end time. They carry no date and are
/// not parse failures.
pub const END_TIME_STATUS_LABELS: &[&str] = &[PENDING_CONFIRMATION, "Đã kết thúc", "Đang diễn ra"];

/// Display formats used by the vi-VN pages, most common first.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Cell contents the exchange uses for "no value".
const EMPTY_MARKERS: &[&str] = &["", "-", "--", "—"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized<T> {
    Value(T),
    /// Explicit "pending confirmation" marker, stored as NULL.
    Pending,
    /// Missing or unparseable.
    Unknown,
}

// ---------------------------------------------------------------------------
// Decimals
// ---------------------------------------------------------------------------

/// Parse a displayed number such as `1,234.5`, `1.234,5`, `-3.2%`, `12.5K`
/// or `0.0041 USDT`.
pub fn decimal(raw: &str) -> Normalized<Decimal> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    let compact = compact.trim_start_matches(['$', '≈', '~']);

    let split = compact
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | ',' | '+' | '-')))
        .unwrap_or(compact.len());
    let (number, suffix) = compact.split_at(split);

    let multiplier = match suffix {
        "" | "%" => Decimal::ONE,
        "K" | "k" => Decimal::new(1_000, 0),
        "M" | "m" => Decimal::new(1_000_000, 0),
        "B" | "b" => Decimal::new(1_000_000_000, 0),
        unit if unit.chars().all(char::is_alphabetic) => Decimal::ONE,
        _ => return Normalized::Unknown,
    };

    let Some(canonical) = canonical_number(number) else {
        return Normalized::Unknown;
    };

    match Decimal::from_str(&canonical).ok().and_then(|d| d.checked_mul(multiplier)) {
        Some(d) => Normalized::Value(d.normalize()),
        None => Normalized::Unknown,
    }
}

/// Rewrite a localized number into `-1234.5` form.
///
/// With both separators present the rightmost one is the decimal point. A lone
/// comma is a decimal point unless it is followed by exactly three digits after
/// a non-zero integer part; repeated dots are thousands separators.
fn canonical_number(number: &str) -> Option<String> {
    let (negative, digits) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    if digits.is_empty() || !digits.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if digits.contains(['+', '-']) {
        return None;
    }

    let dots = digits.matches('.').count();
    let commas = digits.matches(',').count();

    let body = match (dots, commas) {
        (0, 0) => digits.to_string(),
        (_, 0) if dots > 1 => digits.replace('.', ""),
        (_, 0) => digits.to_string(),
        (0, 1) => {
            let (int_part, frac_part) = digits.split_once(',')?;
            let thousands = frac_part.len() == 3 && !int_part.is_empty() && int_part != "0";
            if thousands {
                format!("{int_part}{frac_part}")
            } else {
                format!("{int_part}.{frac_part}")
            }
        }
        (0, _) => digits.replace(',', ""),
        _ => {
            let last_dot = digits.rfind('.')?;
            let last_comma = digits.rfind(',')?;
            if last_dot > last_comma {
                digits.replace(',', "")
            } else {
                digits.replace('.', "").replace(',', ".")
            }
        }
    };

    if body.matches('.').count() > 1 {
        return None;
    }
    Some(if negative { format!("-{body}") } else { body })
}

/// Normalize an optional decimal cell, logging real garbage as a validation
/// warning. Empty cells degrade silently.
pub fn decimal_field(field: &'static str, raw: Option<&str>) -> Option<Decimal> {
    let raw = raw?.trim();
    if EMPTY_MARKERS.contains(&raw) {
        return None;
    }
    match decimal(raw) {
        Normalized::Value(d) => Some(d),
        _ => {
            let err = AppError::Validation { field, raw: raw.to_string() };
            warn!(field, raw, "{err}; stored as unknown");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

pub fn timestamp(raw: &str) -> Normalized<NaiveDateTime> {
    let raw = raw.trim();
    if raw.contains(PENDING_CONFIRMATION) {
        return Normalized::Pending;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Normalized::Value(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(Normalized::Unknown, Normalized::Value)
}

pub fn timestamp_field(field: &'static str, raw: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw?.trim();
    if EMPTY_MARKERS.contains(&raw) {
        return None;
    }
    match timestamp(raw) {
        Normalized::Value(ts) => Some(ts),
        Normalized::Pending => None,
        Normalized::Unknown => {
            if !END_TIME_STATUS_LABELS.iter().any(|label| raw.contains(label)) {
                let err = AppError::Validation { field, raw: raw.to_string() };
                warn!(field, raw, "{err}; stored as unknown");
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Enumerations and keys
// ---------------------------------------------------------------------------

/// Map a side label ("Buy", "Mua", "SELL", "Bán", ...) to its side.
pub fn order_side(label: &str) -> Result<OrderSide> {
    match label.trim().to_lowercase().as_str() {
        "buy" | "mua" | "bid" | "lệnh mua" => Ok(OrderSide::Buy),
        "sell" | "bán" | "ask" | "lệnh bán" => Ok(OrderSide::Sell),
        _ => Err(AppError::Validation { field: "order_type", raw: label.to_string() }),
    }
}

/// Side of the resting order behind a row's action button. The button names
/// the taker action, so "Mua" sits on SELL rows.
pub fn side_from_action(button: &str) -> Result<OrderSide> {
    order_side(button).map(OrderSide::opposite)
}

pub fn symbol(raw: &str) -> Result<String> {
    let cleaned: String = raw.chars().filter(char::is_ascii_alphanumeric).collect();
    if cleaned.is_empty() {
        return Err(AppError::Validation { field: "symbol", raw: raw.to_string() });
    }
    Ok(cleaned)
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Fails only when the symbol is unusable; every other field degrades.
pub fn token(raw: &RawToken) -> Result<TokenRecord> {
    Ok(TokenRecord {
        symbol: symbol(&raw.symbol)?,
        name: raw.name.split_whitespace().collect::<Vec<_>>().join(" "),
        latest_price: decimal_field("latest_price", raw.latest_price.as_deref()),
        price_change_percent: decimal_field("price_change_percent", raw.price_change_percent.as_deref()),
        volume_24h: decimal_field("volume_24h", raw.volume_24h.as_deref()),
        total_volume: decimal_field("total_volume", raw.total_volume.as_deref()),
        start_time: timestamp_field("start_time", raw.start_time.as_deref()),
        end_time: timestamp_field("end_time", raw.end_time.as_deref()),
    })
}

/// `None` when neither price nor quantity survive normalization.
pub fn order_level(raw: &RawOrderBookRow) -> Option<OrderBookLevel> {
    let price = decimal_field("price", Some(&raw.price));
    let quantity = decimal_field("quantity", Some(&raw.quantity));
    if price.is_none() && quantity.is_none() {
        return None;
    }
    Some(OrderBookLevel {
        side: raw.side,
        price,
        quantity,
        total: decimal_field("total", Some(&raw.total)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn decimal_handles_thousands_and_locale_comma() {
        assert_eq!(decimal("1,234.56"), Normalized::Value(dec("1234.56")));
        assert_eq!(decimal("1.234,56"), Normalized::Value(dec("1234.56")));
        assert_eq!(decimal("12,5"), Normalized::Value(dec("12.5")));
        assert_eq!(decimal("1,234"), Normalized::Value(dec("1234")));
        assert_eq!(decimal("0,125"), Normalized::Value(dec("0.125")));
        assert_eq!(decimal("1.234.567"), Normalized::Value(dec("1234567")));
        assert_eq!(decimal("1,234,567.8"), Normalized::Value(dec("1234567.8")));
    }

    #[test]
    fn decimal_strips_units_and_applies_multipliers() {
        assert_eq!(decimal("+3.25%"), Normalized::Value(dec("3.25")));
        assert_eq!(decimal("-0.8%"), Normalized::Value(dec("-0.8")));
        assert_eq!(decimal("12.5K"), Normalized::Value(dec("12500")));
        assert_eq!(decimal("1.2M"), Normalized::Value(dec("1200000")));
        assert_eq!(decimal("2B"), Normalized::Value(dec("2000000000")));
        assert_eq!(decimal("0.0041 USDT"), Normalized::Value(dec("0.0041")));
    }

    #[test]
    fn lowercase_multipliers_scale_like_uppercase() {
        assert_eq!(decimal("12.5k"), decimal("12.5K"));
        assert_eq!(decimal("1.2m"), Normalized::Value(dec("1200000")));
        assert_eq!(decimal("3 b"), Normalized::Value(dec("3000000000")));
        assert_eq!(decimal("7 usdt"), Normalized::Value(dec("7")));
    }

    #[test]
    fn decimal_rejects_non_numeric_without_zeroing() {
        assert_eq!(decimal(""), Normalized::Unknown);
        assert_eq!(decimal("abc"), Normalized::Unknown);
        assert_eq!(decimal("12abc34"), Normalized::Unknown);
        assert_eq!(decimal("1-2"), Normalized::Unknown);
        assert_eq!(decimal_field("price", Some("--")), None);
        assert_eq!(decimal_field("price", None), None);
    }

    #[test]
    fn pending_end_time_is_distinct_from_garbage() {
        assert_eq!(timestamp(PENDING_CONFIRMATION), Normalized::Pending);
        assert_eq!(timestamp("  Đợi xác nhận "), Normalized::Pending);
        assert_eq!(timestamp("next tuesday"), Normalized::Unknown);
        assert_eq!(timestamp_field("end_time", Some(PENDING_CONFIRMATION)), None);
    }

    #[test]
    fn timestamp_parses_display_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 10, 2)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        assert_eq!(timestamp("2025-10-02 14:00:00"), Normalized::Value(expected));
        assert_eq!(timestamp("02/10/2025 14:00"), Normalized::Value(expected));
        assert_eq!(
            timestamp("2025-10-02"),
            Normalized::Value(expected.date().and_hms_opt(0, 0, 0).unwrap())
        );
    }

    #[test]
    fn order_side_labels() {
        assert_eq!(order_side("Mua").unwrap(), OrderSide::Buy);
        assert_eq!(order_side("BÁN").unwrap(), OrderSide::Sell);
        assert_eq!(order_side("sell").unwrap(), OrderSide::Sell);
        assert!(matches!(order_side("Hủy"), Err(AppError::Validation { field: "order_type", .. })));
    }

    #[test]
    fn action_button_maps_to_resting_side() {
        assert_eq!(side_from_action("Mua").unwrap(), OrderSide::Sell);
        assert_eq!(side_from_action("Bán").unwrap(), OrderSide::Buy);
        assert!(side_from_action("").is_err());
    }

    #[test]
    fn token_with_bad_symbol_is_rejected() {
        let raw = RawToken { symbol: " -- ".to_string(), ..Default::default() };
        assert!(matches!(token(&raw), Err(AppError::Validation { field: "symbol", .. })));
    }

    #[test]
    fn token_degrades_bad_fields_to_unknown() {
        let raw = RawToken {
            symbol: "MENTO*".to_string(),
            name: "Mento   Protocol".to_string(),
            latest_price: Some("0,0532".to_string()),
            price_change_percent: Some("n/a?".to_string()),
            volume_24h: Some("1.5K".to_string()),
            total_volume: None,
            start_time: Some("2025-10-01 09:00:00".to_string()),
            end_time: Some(PENDING_CONFIRMATION.to_string()),
        };
        let t = token(&raw).unwrap();
        assert_eq!(t.symbol, "MENTO");
        assert_eq!(t.name, "Mento Protocol");
        assert_eq!(t.latest_price, Some(dec("0.0532")));
        assert_eq!(t.price_change_percent, None);
        assert_eq!(t.volume_24h, Some(dec("1500")));
        assert!(t.start_time.is_some());
        assert_eq!(t.end_time, None);
    }

    #[test]
    fn order_level_drops_rows_without_price_and_quantity() {
        let row = |price: &str, quantity: &str| RawOrderBookRow {
            side: OrderSide::Buy,
            price: price.to_string(),
            quantity: quantity.to_string(),
            total: "10".to_string(),
        };
        assert!(order_level(&row("", "")).is_none());
        let level = order_level(&row("0.05", "")).unwrap();
        assert_eq!(level.price, Some(dec("0.05")));
        assert_eq!(level.quantity, None);
        assert_eq!(level.total, Some(dec("10")));
    }
}
