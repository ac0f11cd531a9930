use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const BASE_URL: &str = "https://www.mexc.com/vi-VN/pre-market";
pub const WEBDRIVER_URL: &str = "http://localhost:9515";

/// Browser identity sent by both renderers. The exchange serves a reduced page
/// to clients it does not recognise.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const ACCEPT_LANGUAGE: &str = "vi-VN,vi;q=0.9,en;q=0.8";

/// Retry backoff values in milliseconds. The last value repeats if attempts
/// outnumber entries.
pub const RETRY_BACKOFF_MS: &[u64] = &[1000, 2000, 4000];

/// Attempts for listing and first-page fetches.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Database writes are retried exactly once.
pub const PERSIST_MAX_ATTEMPTS: u32 = 2;
pub const PERSIST_BACKOFF_MS: &[u64] = &[500];

/// Upper bound on pages visited per order-book side.
pub const MAX_PAGES_PER_SIDE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    WebDriver,
    Http,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    /// Listing page URL; per-token pages live at `{base_url}/{SYMBOL}`.
    pub base_url: String,
    pub renderer: RendererKind,
    pub webdriver_url: String,
    pub backup_dir: PathBuf,
    pub retry_max_attempts: u32,
    pub retry_backoff_ms: Vec<u64>,
    pub max_pages_per_side: u32,
    /// Bounds one token's whole pagination loop (PAGE_TIMEOUT_SECS).
    pub page_timeout: Duration,
    /// Per-request timeout applied by the renderer (REQUEST_TIMEOUT_SECS).
    pub request_timeout: Duration,
    /// Aborts remaining tokens once elapsed (RUN_TIMEOUT_SECS).
    pub run_timeout: Duration,
    /// Delay after a pagination click before the DOM is read (SETTLE_MS).
    pub settle: Duration,
    /// Tokens fetched concurrently; 1 means strictly sequential (CRAWL_CONCURRENCY).
    pub crawl_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let renderer = match std::env::var("RENDERER")
            .unwrap_or_else(|_| "webdriver".to_string())
            .to_lowercase()
            .as_str()
        {
            "webdriver" | "browser" => RendererKind::WebDriver,
            "http" => RendererKind::Http,
            other => {
                return Err(AppError::Config(format!(
                    "RENDERER must be 'webdriver' or 'http', got '{other}'"
                )))
            }
        };

        let retry_backoff_ms = match std::env::var("RETRY_BACKOFF_MS") {
            Ok(raw) => parse_backoff_list(&raw)?,
            Err(_) => RETRY_BACKOFF_MS.to_vec(),
        };

        let crawl_concurrency = env_number::<usize>("CRAWL_CONCURRENCY", 1)?;
        if crawl_concurrency == 0 {
            return Err(AppError::Config("CRAWL_CONCURRENCY must be at least 1".to_string()));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "premarket.db".to_string()),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            renderer,
            webdriver_url: std::env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| WEBDRIVER_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            backup_dir: PathBuf::from(std::env::var("BACKUP_DIR").unwrap_or_else(|_| ".".to_string())),
            retry_max_attempts: env_number("RETRY_MAX_ATTEMPTS", RETRY_MAX_ATTEMPTS)?.max(1),
            retry_backoff_ms,
            max_pages_per_side: env_number("MAX_PAGES_PER_SIDE", MAX_PAGES_PER_SIDE)?.max(1),
            page_timeout: Duration::from_secs(env_number("PAGE_TIMEOUT_SECS", 120)?),
            request_timeout: Duration::from_secs(env_number("REQUEST_TIMEOUT_SECS", 30)?),
            run_timeout: Duration::from_secs(env_number("RUN_TIMEOUT_SECS", 1800)?),
            settle: Duration::from_millis(env_number("SETTLE_MS", 1500)?),
            crawl_concurrency,
        })
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn parse_backoff_list(raw: &str) -> Result<Vec<u64>> {
    let values = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| AppError::Config(format!("RETRY_BACKOFF_MS has a bad entry '{s}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    if values.is_empty() {
        return Err(AppError::Config("RETRY_BACKOFF_MS must list at least one delay".to_string()));
    }
    Ok(values)
}
