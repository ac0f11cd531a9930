use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::normalize::{self, END_TIME_STATUS_LABELS};
use crate::render::Renderer;
use crate::retry::RetryPolicy;
use crate::scrape::{ensure_not_error_page, html};
use crate::types::RawToken;

/// Class of the `<ul>` holding one `<li>` card per token.
pub const TOKEN_LIST_CLASS: &str = "ant-list-items";

lazy_static! {
    static ref LATEST_PRICE: Regex = Regex::new(r"Giá giao dịch mới nhất\s*([\d.,]+)").unwrap();
    static ref PRICE_CHANGE: Regex = Regex::new(r"([+-]?\d+(?:[.,]\d+)?)\s*%").unwrap();
    // The unit suffix must sit on the number's own line and stand alone.
    static ref VOLUME_24H: Regex =
        Regex::new(r"Khối lượng 24 giờ\s*([\d.,]+(?:[ \t]?[KkMmBb]\b)?)").unwrap();
    static ref TOTAL_VOLUME: Regex =
        Regex::new(r"Tổng khối lượng\s*([\d.,]+(?:[ \t]?[KkMmBb]\b)?)").unwrap();
    static ref DATETIME: Regex = Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").unwrap();
}

/// Fetches the pre-market listing page and extracts its token cards.
pub struct TokenLister {
    renderer: Arc<dyn Renderer>,
    url: String,
    retry: RetryPolicy,
}

impl TokenLister {
    pub fn new(renderer: Arc<dyn Renderer>, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self { renderer, url: url.into(), retry }
    }

    /// Tokens in page order, one per symbol.
    ///
    /// `Fetch` means the page never loaded; `Parse` means it loaded without any
    /// token cards, which points at layout drift rather than an empty market.
    pub async fn list_tokens(&self) -> Result<Vec<RawToken>> {
        let tokens = self.retry.run("listing page", || self.fetch_once()).await?;
        info!(url = %self.url, tokens = tokens.len(), "Listing page parsed: {} tokens", tokens.len());
        Ok(tokens)
    }

    async fn fetch_once(&self) -> Result<Vec<RawToken>> {
        let mut page = self.renderer.open(&self.url).await?;
        let dom = page.content().await;
        page.close().await;
        let dom = dom?;
        ensure_not_error_page(&dom, &self.url)?;
        parse_listing(&dom)
    }
}

/// Extract every token card. A symbol seen twice keeps its first position and
/// its last-seen values.
pub fn parse_listing(dom: &str) -> Result<Vec<RawToken>> {
    let list = html::find_by_class(dom, TOKEN_LIST_CLASS)
        .ok_or_else(|| AppError::Parse(format!("token list `{TOKEN_LIST_CLASS}` not found")))?;

    let mut tokens: Vec<RawToken> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (idx, item) in html::elements(list.inner, "li").into_iter().enumerate() {
        let lines = html::text_lines(item.inner);
        let Some(first) = lines.first() else {
            debug!(card = idx, "skipping empty token card");
            continue;
        };
        let symbol = match normalize::symbol(first) {
            Ok(s) => s,
            Err(e) => {
                warn!(card = idx, "{e}; token card dropped");
                continue;
            }
        };
        let token = parse_card(symbol, &lines);
        match positions.get(&token.symbol) {
            Some(&pos) => {
                debug!(symbol = %token.symbol, "duplicate token card; keeping the later one");
                tokens[pos] = token;
            }
            None => {
                positions.insert(token.symbol.clone(), tokens.len());
                tokens.push(token);
            }
        }
    }

    if tokens.is_empty() {
        return Err(AppError::Parse("listing page has no token cards".to_string()));
    }
    Ok(tokens)
}

fn parse_card(symbol: String, lines: &[String]) -> RawToken {
    let text = lines.join("\n");
    let capture = |re: &Regex| {
        re.captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };

    let times: Vec<&str> = DATETIME.find_iter(&text).map(|m| m.as_str()).collect();
    let end_time = times.get(1).map(|t| t.to_string()).or_else(|| {
        END_TIME_STATUS_LABELS
            .iter()
            .find(|label| text.contains(*label))
            .map(|label| label.to_string())
    });

    RawToken {
        symbol,
        name: lines.get(1).cloned().unwrap_or_default(),
        latest_price: capture(&*LATEST_PRICE),
        price_change_percent: capture(&*PRICE_CHANGE),
        volume_24h: capture(&*VOLUME_24H),
        total_volume: capture(&*TOTAL_VOLUME),
        start_time: times.first().map(|t| t.to_string()),
        end_time,
    }
}
