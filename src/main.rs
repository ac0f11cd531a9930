mod backup;
mod config;
mod coordinator;
mod db;
mod error;
mod normalize;
mod render;
mod retry;
mod scrape;
mod types;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::coordinator::RunCoordinator;
use crate::db::{Reconciler, Table};
use crate::error::{AppError, Result};
use crate::render::create_renderer;

/// What one invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Crawl every listed token, or only `symbol`.
    Crawl { symbol: Option<String> },
    /// Walk one token's order book and report pages per side; stores nothing.
    Count { symbol: String },
    Help,
}

impl Command {
    /// `args` excludes the program name.
    fn parse(args: &[String]) -> Result<Self> {
        match args.first().map(String::as_str) {
            None => Ok(Command::Crawl { symbol: None }),
            Some("--help") | Some("-h") | Some("help") => Ok(Command::Help),
            Some(cmd @ ("crawl" | "count")) => {
                let raw = args
                    .get(1)
                    .ok_or_else(|| AppError::Config(format!("'{cmd}' needs a token symbol")))?;
                if args.len() > 2 {
                    return Err(AppError::Config(format!("unexpected argument '{}'", args[2])));
                }
                let symbol = normalize::symbol(&raw.to_uppercase())
                    .map_err(|_| AppError::Config(format!("'{raw}' is not a token symbol")))?;
                Ok(if cmd == "crawl" {
                    Command::Crawl { symbol: Some(symbol) }
                } else {
                    Command::Count { symbol }
                })
            }
            Some(other) => Err(AppError::Config(format!("unknown command '{other}'"))),
        }
    }
}

fn print_usage() {
    println!("premarket-crawler - MEXC pre-market token and order-book crawler");
    println!();
    println!("Usage:");
    println!("  crawler                 # Crawl every listed token");
    println!("  crawler crawl SYMBOL    # Crawl and store one listed token");
    println!("  crawler count SYMBOL    # Count order-book pages per side, store nothing");
    println!("  crawler --help          # Show this help message");
    println!();
    println!("Settings come from the environment (RENDERER, WEBDRIVER_URL, DB_PATH, BACKUP_DIR, ...).");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(Command::Help) => {
            print_usage();
            return;
        }
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            std::process::exit(1);
        }
    };

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg, command).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, command: Command) -> Result<()> {
    if let Command::Count { symbol } = &command {
        let renderer = create_renderer(&cfg)?;
        let sides = RunCoordinator::from_config(&cfg, renderer, None).count_pages(symbol).await?;
        let pages: u32 = sides.iter().map(|s| s.pages).sum();
        info!(symbol = %symbol, pages, "{symbol}: {pages} order-book pages in total");
        return Ok(());
    }

    info!(
        base_url = %cfg.base_url,
        renderer = ?cfg.renderer,
        "Crawl starting: {} (max {} pages/side, concurrency {})",
        cfg.base_url,
        cfg.max_pages_per_side,
        cfg.crawl_concurrency,
    );

    // --- Database (optional: a dead database still gets a backup) ---
    let reconciler = match Reconciler::connect(&cfg.db_path).await {
        Ok(r) => Some(r),
        Err(e) => {
            warn!("Database unavailable at {}: {e}; scraping into backup only", cfg.db_path);
            None
        }
    };

    let renderer = create_renderer(&cfg)?;
    let mut coordinator = RunCoordinator::from_config(&cfg, renderer, reconciler.clone());
    if let Command::Crawl { symbol: Some(symbol) } = command {
        info!(symbol = %symbol, "Single-token crawl");
        coordinator = coordinator.with_symbol(symbol);
    }
    let result = coordinator.run().await;

    if let Some(db) = reconciler {
        match (db.count(Table::Tokens).await, db.count(Table::OrderBookEntries).await) {
            (Ok(tokens), Ok(entries)) => info!(tokens, entries, "Database holds {tokens} tokens, {entries} order-book entries"),
            (Err(e), _) | (_, Err(e)) => warn!("Could not count stored rows: {e}"),
        }
        db.close().await;
    }
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_crawls_everything() {
        assert_eq!(Command::parse(&[]).unwrap(), Command::Crawl { symbol: None });
        assert_eq!(Command::parse(&args(&["-h"])).unwrap(), Command::Help);
    }

    #[test]
    fn symbol_commands_normalize_their_symbol() {
        assert_eq!(
            Command::parse(&args(&["crawl", "mento"])).unwrap(),
            Command::Crawl { symbol: Some("MENTO".to_string()) }
        );
        assert_eq!(
            Command::parse(&args(&["count", "plsm/usdt"])).unwrap(),
            Command::Count { symbol: "PLSMUSDT".to_string() }
        );
    }

    #[test]
    fn bad_invocations_are_config_errors() {
        let cases: [&[&str]; 4] = [&["count"], &["crawl", "***"], &["crawl", "A", "B"], &["serve"]];
        for bad in cases {
            assert!(matches!(Command::parse(&args(bad)), Err(AppError::Config(_))), "{bad:?}");
        }
    }
}
