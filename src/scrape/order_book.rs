use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::normalize;
use crate::render::{Control, Page, Renderer};
use crate::retry::RetryPolicy;
use crate::scrape::{ensure_not_error_page, html};
use crate::types::{OrderSide, RawOrderBookRow};

/// Class-name fragment of each side's table. The full names carry a build
/// hash (`order-book-table_sellTable__Dxd2s`).
pub fn table_marker(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Sell => "sellTable",
        OrderSide::Buy => "buyTable",
    }
}

const PAGINATION_NEXT_CLASS: &str = "ant-pagination-next";
const PAGINATION_DISABLED_CLASS: &str = "ant-pagination-disabled";
const MEASURE_ROW_CLASS: &str = "ant-table-measure-row";

/// Why a side stopped paginating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// The page had no rows.
    EmptyPage,
    /// The page repeated the previous one; the "next" control did not advance.
    Repeated,
    /// No enabled "next" control.
    LastPage,
    /// Page cap reached with more pages available.
    PageCap,
    /// A later page failed to load; the tail is lost.
    Truncated,
    /// The pagination time budget ran out.
    Deadline,
    /// The side's table was absent from the page.
    TableMissing,
}

impl Exhaustion {
    /// True when rows may be missing from the result.
    pub fn is_degraded(self) -> bool {
        matches!(
            self,
            Exhaustion::PageCap | Exhaustion::Truncated | Exhaustion::Deadline | Exhaustion::TableMissing
        )
    }
}

impl std::fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Exhaustion::EmptyPage => "empty_page",
            Exhaustion::Repeated => "repeated_page",
            Exhaustion::LastPage => "last_page",
            Exhaustion::PageCap => "page_cap",
            Exhaustion::Truncated => "truncated",
            Exhaustion::Deadline => "deadline",
            Exhaustion::TableMissing => "table_missing",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideReport {
    pub side: OrderSide,
    /// Distinct pages whose rows were kept.
    pub pages: u32,
    pub rows: usize,
    pub exhaustion: Exhaustion,
}

/// Rows of both sides for one token, with how each side ended.
#[derive(Debug, Clone, Default)]
pub struct OrderBookFetch {
    pub rows: Vec<RawOrderBookRow>,
    pub sides: Vec<SideReport>,
}

impl OrderBookFetch {
    pub fn is_partial(&self) -> bool {
        self.sides.iter().any(|s| s.exhaustion.is_degraded())
    }
}

/// One side's table as currently rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideTable {
    pub rows: Vec<RawOrderBookRow>,
    pub has_next: bool,
}

/// Per-side pagination state.
enum SideState {
    Init,
    Loaded {
        page: u32,
        table: SideTable,
        previous: Option<Vec<RawOrderBookRow>>,
    },
    Exhausted(Exhaustion),
}

/// Walks both sides of a token's order-book widget page by page.
pub struct OrderBookPaginator {
    renderer: Arc<dyn Renderer>,
    base_url: String,
    retry: RetryPolicy,
    max_pages_per_side: u32,
    page_timeout: Duration,
}

impl OrderBookPaginator {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        base_url: impl Into<String>,
        retry: RetryPolicy,
        max_pages_per_side: u32,
        page_timeout: Duration,
    ) -> Self {
        Self {
            renderer,
            base_url: base_url.into(),
            retry,
            max_pages_per_side: max_pages_per_side.max(1),
            page_timeout,
        }
    }

    pub fn token_url(&self, symbol: &str) -> String {
        format!("{}/{symbol}", self.base_url.trim_end_matches('/'))
    }

    /// Both sides of `symbol`'s book, bounded by the page timeout and by
    /// `run_deadline`. Pagination cut short by either returns what was read.
    pub async fn fetch_order_book(&self, symbol: &str, run_deadline: Instant) -> Result<OrderBookFetch> {
        let deadline = run_deadline.min(Instant::now() + self.page_timeout);
        let url = self.token_url(symbol);

        // Attempts past the deadline would only time out immediately.
        let (mut page, mut dom) = self
            .retry
            .run_if(
                &format!("order book for {symbol}"),
                |e| e.is_retryable() && Instant::now() < deadline,
                || self.open_first_page(&url, deadline),
            )
            .await?;

        let mut fetch = OrderBookFetch::default();
        for side in OrderSide::BOTH {
            let report = self
                .paginate_side(page.as_mut(), symbol, side, &mut dom, deadline, &mut fetch.rows)
                .await;
            fetch.sides.push(report);
        }
        page.close().await;

        info!(
            symbol,
            rows = fetch.rows.len(),
            partial = fetch.is_partial(),
            "Order book fetched: {} rows ({})",
            fetch.rows.len(),
            fetch
                .sides
                .iter()
                .map(|s| format!("{} {} rows in {}p, {}", s.side, s.rows, s.pages, s.exhaustion))
                .collect::<Vec<_>>()
                .join(", "),
        );
        Ok(fetch)
    }

    /// Load the token page and check that at least one table rendered.
    async fn open_first_page(&self, url: &str, deadline: Instant) -> Result<(Box<dyn Page>, String)> {
        let mut page = timeout_at(deadline, self.renderer.open(url)).await??;
        let dom = match timeout_at(deadline, page.content()).await {
            Ok(Ok(dom)) => dom,
            Ok(Err(e)) => {
                page.close().await;
                return Err(e);
            }
            Err(elapsed) => {
                page.close().await;
                return Err(elapsed.into());
            }
        };

        let checked = ensure_not_error_page(&dom, url).and_then(|_| {
            let any_table = OrderSide::BOTH
                .iter()
                .any(|side| html::find_by_class(&dom, table_marker(*side)).is_some());
            if any_table {
                Ok(())
            } else {
                Err(AppError::Parse(format!("{url} has no order-book tables")))
            }
        });
        if let Err(e) = checked {
            page.close().await;
            return Err(e);
        }
        Ok((page, dom))
    }

    /// INIT → LOADED(1) → LOADED(n+1) → EXHAUSTED for one side. Rows of every
    /// distinct page are appended to `out`; `dom` tracks the latest page text.
    async fn paginate_side(
        &self,
        page: &mut dyn Page,
        symbol: &str,
        side: OrderSide,
        dom: &mut String,
        deadline: Instant,
        out: &mut Vec<RawOrderBookRow>,
    ) -> SideReport {
        let rows_before = out.len();
        let mut pages = 0;
        let mut state = SideState::Init;

        let exhaustion = loop {
            state = match state {
                SideState::Exhausted(reason) => break reason,

                SideState::Init => match parse_side(dom, side) {
                    Ok(table) => SideState::Loaded { page: 1, table, previous: None },
                    Err(e) => {
                        warn!(symbol, %side, "{e}");
                        SideState::Exhausted(Exhaustion::TableMissing)
                    }
                },

                SideState::Loaded { page: n, table, previous } => {
                    if table.rows.is_empty() {
                        SideState::Exhausted(Exhaustion::EmptyPage)
                    } else if previous.as_ref() == Some(&table.rows) {
                        debug!(symbol, %side, page = n, "page repeated the previous one");
                        SideState::Exhausted(Exhaustion::Repeated)
                    } else {
                        pages = n;
                        out.extend(table.rows.iter().cloned());

                        if !table.has_next {
                            SideState::Exhausted(Exhaustion::LastPage)
                        } else if n >= self.max_pages_per_side {
                            warn!(symbol, %side, cap = self.max_pages_per_side, "page cap reached; keeping partial book");
                            SideState::Exhausted(Exhaustion::PageCap)
                        } else {
                            self.advance(page, symbol, side, n, table.rows, dom, deadline).await
                        }
                    }
                }
            };
        };

        SideReport { side, pages, rows: out.len() - rows_before, exhaustion }
    }

    /// Click through to page `n + 1`. Failures here truncate the side.
    #[allow(clippy::too_many_arguments)]
    async fn advance(
        &self,
        page: &mut dyn Page,
        symbol: &str,
        side: OrderSide,
        n: u32,
        current_rows: Vec<RawOrderBookRow>,
        dom: &mut String,
        deadline: Instant,
    ) -> SideState {
        if Instant::now() >= deadline {
            warn!(symbol, %side, page = n, "pagination time budget spent; keeping partial book");
            return SideState::Exhausted(Exhaustion::Deadline);
        }

        let next = n + 1;
        let control = Control::GoToPage { side, page: next };
        match timeout_at(deadline, page.interact(&control)).await {
            Ok(Ok(text)) => {
                *dom = text;
                match parse_side(dom, side) {
                    Ok(table) => SideState::Loaded { page: next, table, previous: Some(current_rows) },
                    Err(e) => {
                        warn!(symbol, %side, page = next, "{e}; truncating");
                        SideState::Exhausted(Exhaustion::Truncated)
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(symbol, %side, page = next, "{e}; truncating");
                SideState::Exhausted(Exhaustion::Truncated)
            }
            Err(_) => {
                warn!(symbol, %side, page = next, "page load timed out; keeping partial book");
                SideState::Exhausted(Exhaustion::Deadline)
            }
        }
    }
}

/// Extract one side's visible rows and whether its "next" control is live.
pub fn parse_side(dom: &str, side: OrderSide) -> Result<SideTable> {
    let table = html::find_by_class(dom, table_marker(side))
        .ok_or_else(|| AppError::Parse(format!("{side} table not found")))?;

    let rows = html::elements(table.inner, "tr")
        .into_iter()
        .filter_map(|row| parse_row(side, row))
        .collect();

    // The pagination wrapper sits inside the table container or right after
    // it, before the other side's table.
    let tail = &dom[table.end..];
    let tail = match html::find_by_class(tail, table_marker(side.opposite())) {
        Some(other) => &tail[..other.start],
        None => tail,
    };
    let has_next = next_enabled(table.inner).or_else(|| next_enabled(tail)).unwrap_or(false);

    Ok(SideTable { rows, has_next })
}

/// `None` when the fragment has no "next" control at all.
fn next_enabled(fragment: &str) -> Option<bool> {
    let next = html::find_by_class(fragment, PAGINATION_NEXT_CLASS)?;
    let disabled = next.has_class(PAGINATION_DISABLED_CLASS)
        || next.attr("aria-disabled") == Some("true")
        || html::find_by_class(next.inner, "disabled").is_some()
        || html::elements(next.inner, "button")
            .iter()
            .any(|b| b.attrs.contains("disabled"));
    Some(!disabled)
}

fn parse_row(table_side: OrderSide, row: html::Element<'_>) -> Option<RawOrderBookRow> {
    if row.attr("aria-hidden") == Some("true") || row.has_class(MEASURE_ROW_CLASS) {
        return None;
    }
    let cells = html::elements(row.inner, "td");
    if cells.len() < 3 {
        return None;
    }
    let price = cells[0].text();
    let quantity = cells[1].text();
    let total = cells[2].text();
    if price.is_empty() && quantity.is_empty() {
        return None;
    }

    let side = match html::elements(row.inner, "button").first() {
        Some(button) => match normalize::side_from_action(&button.text()) {
            Ok(side) => {
                if side != table_side {
                    debug!(%side, %table_side, price, "row button disagrees with its table");
                }
                side
            }
            Err(e) => {
                warn!(%table_side, price, "{e}; order row dropped");
                return None;
            }
        },
        None => table_side,
    };

    Some(RawOrderBookRow { side, price, quantity, total })
}
