use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::backup::BackupWriter;
use crate::config::Config;
use crate::db::Reconciler;
use crate::error::{AppError, Result};
use crate::normalize;
use crate::render::Renderer;
use crate::retry::RetryPolicy;
use crate::scrape::order_book::SideReport;
use crate::scrape::{OrderBookPaginator, TokenLister};
use crate::types::{OrderBookLevel, TokenRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    /// Both sides paginated to their natural end.
    Complete,
    /// Rows were kept but at least one side was cut short.
    Partial,
    Failed(String),
    /// Not attempted before the run deadline.
    Skipped,
}

impl std::fmt::Display for TokenOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenOutcome::Complete => write!(f, "complete"),
            TokenOutcome::Partial => write!(f, "partial"),
            TokenOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            TokenOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenReport {
    pub symbol: String,
    pub outcome: TokenOutcome,
    pub entries_inserted: usize,
    /// False when the order book reached the backup but not the database.
    pub persisted: bool,
}

/// One crawl run, reported as a single log line at the end.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tokens_listed: usize,
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    pub entries_inserted: usize,
    pub persistence_failures: usize,
    pub backup: Option<PathBuf>,
    pub tokens: Vec<TokenReport>,
}

impl RunSummary {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            tokens_listed: 0,
            complete: 0,
            partial: 0,
            failed: 0,
            skipped: 0,
            entries_inserted: 0,
            persistence_failures: 0,
            backup: None,
            tokens: Vec::new(),
        }
    }

    fn record(&mut self, report: TokenReport) {
        match report.outcome {
            TokenOutcome::Complete => self.complete += 1,
            TokenOutcome::Partial => self.partial += 1,
            TokenOutcome::Failed(_) => self.failed += 1,
            TokenOutcome::Skipped => self.skipped += 1,
        }
        if !report.persisted && !matches!(report.outcome, TokenOutcome::Failed(_) | TokenOutcome::Skipped) {
            self.persistence_failures += 1;
        }
        self.entries_inserted += report.entries_inserted;
        self.tokens.push(report);
    }

    pub fn log(&self) {
        let backup = self
            .backup
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string());
        let elapsed = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        let failed: Vec<&str> = self
            .tokens
            .iter()
            .filter(|t| matches!(t.outcome, TokenOutcome::Failed(_)))
            .map(|t| t.symbol.as_str())
            .collect();
        info!(
            event = "RUN_SUMMARY",
            tokens_listed = self.tokens_listed,
            complete = self.complete,
            partial = self.partial,
            failed = self.failed,
            skipped = self.skipped,
            entries_inserted = self.entries_inserted,
            persistence_failures = self.persistence_failures,
            backup = %backup,
            "RUN DONE | listed: {} | complete: {} | partial: {} | failed: {} {:?} | skipped: {} | entries: {} | db failures: {} | {:.1}s | backup: {}",
            self.tokens_listed,
            self.complete,
            self.partial,
            self.failed,
            failed,
            self.skipped,
            self.entries_inserted,
            self.persistence_failures,
            elapsed,
            backup,
        );
    }
}

/// Lists tokens, reconciles them, then fetches and stores each order book.
pub struct RunCoordinator {
    lister: TokenLister,
    paginator: OrderBookPaginator,
    reconciler: Option<Reconciler>,
    backup_dir: PathBuf,
    run_timeout: Duration,
    concurrency: usize,
    /// Crawl only this symbol from the listing.
    only: Option<String>,
}

impl RunCoordinator {
    pub fn new(
        lister: TokenLister,
        paginator: OrderBookPaginator,
        reconciler: Option<Reconciler>,
        backup_dir: impl Into<PathBuf>,
        run_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            lister,
            paginator,
            reconciler,
            backup_dir: backup_dir.into(),
            run_timeout,
            concurrency: concurrency.max(1),
            only: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.only = Some(symbol.into());
        self
    }

    /// `reconciler` is `None` when the database could not be opened; the run
    /// then scrapes into the backup only.
    pub fn from_config(cfg: &Config, renderer: Arc<dyn Renderer>, reconciler: Option<Reconciler>) -> Self {
        let retry = RetryPolicy::scraping(cfg);
        let lister = TokenLister::new(renderer.clone(), cfg.base_url.clone(), retry.clone());
        let paginator = OrderBookPaginator::new(
            renderer,
            cfg.base_url.clone(),
            retry,
            cfg.max_pages_per_side,
            cfg.page_timeout,
        );
        Self::new(lister, paginator, reconciler, cfg.backup_dir.clone(), cfg.run_timeout, cfg.crawl_concurrency)
    }

    /// Errors only when no tokens could be listed.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::new(Utc::now());
        let deadline = Instant::now() + self.run_timeout;

        let backup = match BackupWriter::create(&self.backup_dir, summary.started_at).await {
            Ok(writer) => {
                summary.backup = Some(writer.path().to_path_buf());
                Some(writer)
            }
            Err(e) => {
                error!(dir = %self.backup_dir.display(), "Backup artifact unavailable: {e}");
                None
            }
        };
        let backup = Mutex::new(backup);

        let listed = timeout_at(deadline, self.lister.list_tokens())
            .await
            .map_err(AppError::from)
            .and_then(|r| r);
        let raw_tokens = match listed {
            Ok(tokens) => tokens,
            Err(e) if e.is_fetch() => {
                error!("Listing page unreachable; aborting run: {e}");
                return Err(e);
            }
            Err(e) => {
                error!("Listing page has no token cards, layout may have changed; aborting run: {e}");
                return Err(e);
            }
        };
        summary.tokens_listed = raw_tokens.len();

        let mut tokens: Vec<(TokenRecord, Option<i64>)> = Vec::with_capacity(raw_tokens.len());
        for raw in &raw_tokens {
            let record = match normalize::token(raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(symbol = %raw.symbol, "{e}; token dropped");
                    continue;
                }
            };
            if self.only.as_ref().is_some_and(|only| *only != record.symbol) {
                continue;
            }
            let token_id = self.reconcile_token(&record, &backup).await;
            tokens.push((record, token_id));
        }
        flush(&backup).await;

        if let Some(only) = &self.only {
            if tokens.is_empty() {
                error!(symbol = %only, listed = raw_tokens.len(), "Symbol not on the listing page; aborting run");
                return Err(AppError::Parse(format!("{only} is not on the listing page")));
            }
            summary.tokens_listed = tokens.len();
        }

        let reports: Vec<TokenReport> = stream::iter(tokens.iter())
            .map(|(record, token_id)| self.crawl_token(record, *token_id, deadline, &backup))
            .buffered(self.concurrency)
            .collect()
            .await;
        for report in reports {
            summary.record(report);
        }

        flush(&backup).await;
        summary.finished_at = Utc::now();
        summary.log();
        Ok(summary)
    }

    /// Paginate `symbol`'s book without storing anything and report how many
    /// pages each side has.
    pub async fn count_pages(&self, symbol: &str) -> Result<Vec<SideReport>> {
        let deadline = Instant::now() + self.run_timeout;
        let fetch = self.paginator.fetch_order_book(symbol, deadline).await?;
        for side in &fetch.sides {
            info!(
                symbol,
                side = %side.side,
                pages = side.pages,
                rows = side.rows,
                exhaustion = %side.exhaustion,
                "PAGES | {symbol} {}: {} pages, {} rows ({})",
                side.side,
                side.pages,
                side.rows,
                side.exhaustion,
            );
        }
        Ok(fetch.sides)
    }

    async fn reconcile_token(&self, record: &TokenRecord, backup: &Mutex<Option<BackupWriter>>) -> Option<i64> {
        if let Some(writer) = backup.lock().await.as_mut() {
            if let Err(e) = writer.write_token(record, Utc::now()).await {
                error!(symbol = %record.symbol, "Backup write failed: {e}");
            }
        }
        let reconciler = self.reconciler.as_ref()?;
        match reconciler.upsert_token(record).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(symbol = %record.symbol, "Token upsert failed: {e}");
                None
            }
        }
    }

    async fn crawl_token(
        &self,
        record: &TokenRecord,
        token_id: Option<i64>,
        deadline: Instant,
        backup: &Mutex<Option<BackupWriter>>,
    ) -> TokenReport {
        let symbol = record.symbol.as_str();
        let mut report = TokenReport {
            symbol: symbol.to_string(),
            outcome: TokenOutcome::Skipped,
            entries_inserted: 0,
            persisted: false,
        };

        if Instant::now() >= deadline {
            warn!(symbol, "Run deadline reached; token skipped");
            return report;
        }

        let fetch = match self.paginator.fetch_order_book(symbol, deadline).await {
            Ok(fetch) => fetch,
            Err(e) => {
                error!(symbol, "Order book failed: {e}");
                report.outcome = TokenOutcome::Failed(e.to_string());
                return report;
            }
        };
        report.outcome = if fetch.is_partial() { TokenOutcome::Partial } else { TokenOutcome::Complete };

        let levels: Vec<OrderBookLevel> = fetch.rows.iter().filter_map(normalize::order_level).collect();
        if levels.len() < fetch.rows.len() {
            debug!(symbol, dropped = fetch.rows.len() - levels.len(), "rows without price or quantity dropped");
        }

        let crawled_at = Utc::now();
        if let Some(writer) = backup.lock().await.as_mut() {
            if let Err(e) = writer.write_order_book(symbol, &levels, crawled_at).await {
                error!(symbol, "Backup write failed: {e}");
            }
        }

        let (Some(reconciler), Some(token_id)) = (self.reconciler.as_ref(), token_id) else {
            warn!(symbol, rows = levels.len(), "Token not in database; order book kept in backup only");
            return report;
        };
        match reconciler.insert_snapshot(token_id, &levels, crawled_at).await {
            Ok(snapshot) => {
                report.entries_inserted = snapshot.rows;
                report.persisted = true;
                info!(
                    symbol,
                    token_id = snapshot.token_id,
                    rows = snapshot.rows,
                    crawled_at = %snapshot.crawled_at,
                    outcome = %report.outcome,
                    "Order book stored",
                );
            }
            Err(e) => error!(symbol, "Order book insert failed: {e}; rows kept in backup"),
        }
        report
    }
}

async fn flush(backup: &Mutex<Option<BackupWriter>>) {
    if let Some(writer) = backup.lock().await.as_mut() {
        if let Err(e) = writer.flush().await {
            error!(path = %writer.path().display(), "Backup flush failed: {e}");
        }
    }
}
