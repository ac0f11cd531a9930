//! Page-specific extraction: where each field lives in the exchange's markup.

pub mod html;
pub mod listing;
pub mod order_book;

pub use listing::TokenLister;
pub use order_book::OrderBookPaginator;

use crate::error::{AppError, Result};

/// The exchange answers unknown symbols and outages with a normal 200 page
/// whose title gives it away.
pub fn ensure_not_error_page(dom: &str, url: &str) -> Result<()> {
    if let Some(title) = html::page_title(dom) {
        if title.contains("404") || title.to_lowercase().contains("error") {
            return Err(AppError::Parse(format!("{url} rendered an error page: {title}")));
        }
    }
    Ok(())
}
