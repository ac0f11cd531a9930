//! In-memory renderer serving canned DOM text, for offline tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::render::{Control, Page, Renderer};
use crate::types::OrderSide;

#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub initial: String,
    /// Number of `open` calls that fail before the page loads.
    pub failing_opens: u32,
    /// `open` never completes.
    pub hangs: bool,
    /// DOM after a pagination click; `Err` simulates a failed interaction.
    pub clicks: HashMap<(OrderSide, u32), std::result::Result<String, String>>,
}

impl ScriptedPage {
    pub fn new(initial: impl Into<String>) -> Self {
        Self { initial: initial.into(), ..Default::default() }
    }

    pub fn always_failing() -> Self {
        Self { failing_opens: u32::MAX, ..Default::default() }
    }

    pub fn hanging() -> Self {
        Self { hangs: true, ..Default::default() }
    }

    pub fn failing_first(mut self, opens: u32) -> Self {
        self.failing_opens = opens;
        self
    }

    pub fn on_page(mut self, side: OrderSide, page: u32, html: impl Into<String>) -> Self {
        self.clicks.insert((side, page), Ok(html.into()));
        self
    }

    pub fn failing_page(mut self, side: OrderSide, page: u32) -> Self {
        self.clicks.insert((side, page), Err("connection reset".to_string()));
        self
    }
}

#[derive(Default)]
pub struct ScriptedRenderer {
    pages: HashMap<String, ScriptedPage>,
    opens: Mutex<HashMap<String, u32>>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, page: ScriptedPage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    pub fn open_count(&self, url: &str) -> u32 {
        self.opens.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn open(&self, url: &str) -> Result<Box<dyn Page>> {
        let attempt = {
            let mut opens = self.opens.lock().unwrap();
            let n = opens.entry(url.to_string()).or_default();
            *n += 1;
            *n
        };
        let script = self
            .pages
            .get(url)
            .ok_or_else(|| AppError::Fetch(format!("404 for {url}")))?;
        if script.hangs {
            std::future::pending::<()>().await;
        }
        if attempt <= script.failing_opens {
            return Err(AppError::Fetch(format!("scripted failure #{attempt} for {url}")));
        }
        Ok(Box::new(ScriptedSession {
            dom: script.initial.clone(),
            clicks: script.clicks.clone(),
        }))
    }
}

struct ScriptedSession {
    dom: String,
    clicks: HashMap<(OrderSide, u32), std::result::Result<String, String>>,
}

#[async_trait]
impl Page for ScriptedSession {
    async fn content(&mut self) -> Result<String> {
        Ok(self.dom.clone())
    }

    async fn interact(&mut self, control: &Control) -> Result<String> {
        let Control::GoToPage { side, page } = *control;
        match self.clicks.get(&(side, page)) {
            Some(Ok(html)) => {
                self.dom = html.clone();
                Ok(self.dom.clone())
            }
            Some(Err(msg)) => Err(AppError::Fetch(msg.clone())),
            None => Err(AppError::Fetch(format!("{control} control not found"))),
        }
    }

    async fn close(self: Box<Self>) {}
}

// ---------------------------------------------------------------------------
// Markup builders mirroring the exchange's structure
// ---------------------------------------------------------------------------

/// One `(price, quantity, total)` row.
pub type Level<'a> = (&'a str, &'a str, &'a str);

pub fn card(symbol: &str, name: &str, body: &str) -> String {
    format!(
        r#"<li class="ant-list-item"><div class="trade-list-item_wrap"><div class="trade-list-item_currency">{symbol}</div><div class="trade-list-item_fullCurrency__UGLmN">{name}</div>{body}</div></li>"#
    )
}

pub fn listing(cards: &[String]) -> String {
    format!(
        r#"<html><head><title>Pre-Market | MEXC</title></head><body><div id="rc-tabs-0-panel-1"><div class="ant-list"><ul class="ant-list-items">{}</ul></div></div></body></html>"#,
        cards.concat()
    )
}

fn table(side: OrderSide, levels: &[Level<'_>], has_next: bool) -> String {
    let (class, button) = match side {
        OrderSide::Sell => ("order-book-table_sellTable__Dxd2s", "Mua"),
        OrderSide::Buy => ("order-book-table_buyTable__xqBVW", "Bán"),
    };
    let rows: String = levels
        .iter()
        .map(|(price, qty, total)| {
            format!(
                r#"<tr class="ant-table-row"><td><span class="order-book-table_price">{price}</span></td><td><div class="order-book-table_content__ZSAZ_">{qty}</div></td><td><div class="order-book-table_content__ZSAZ_">{total}</div></td><td><button type="button"><span>{button}</span></button></td></tr>"#
            )
        })
        .collect();
    let next_class = if has_next {
        "ant-pagination-next"
    } else {
        "ant-pagination-next ant-pagination-disabled"
    };
    format!(
        r#"<div class="{class}"><table><thead><tr><th>Giá</th><th>Số lượng</th><th>Tổng</th><th></th></tr></thead><tbody class="ant-table-tbody"><tr aria-hidden="true" class="ant-table-measure-row"><td></td><td></td><td></td></tr>{rows}</tbody></table></div><div class="order-book-table_paginationWrapper__O_FJg"><ul class="ant-pagination"><li title="1" class="ant-pagination-item">1</li><li title="Next Page" class="{next_class}"><button>›</button></li></ul></div>"#
    )
}

/// A token page with both order-book tables.
pub fn order_book_page(sell: &[Level<'_>], sell_next: bool, buy: &[Level<'_>], buy_next: bool) -> String {
    format!(
        r#"<html><head><title>MENTO Pre-Market | MEXC</title></head><body><div class="order-book">{}{}</div></body></html>"#,
        table(OrderSide::Sell, sell, sell_next),
        table(OrderSide::Buy, buy, buy_next)
    )
}
