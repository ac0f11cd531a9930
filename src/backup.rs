//! Flat JSONL copy of everything a run observed, written ahead of the
//! database so an outage never loses scraped data.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::error::Result;
use crate::types::{OrderBookLevel, TokenRecord};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum BackupLine<'a> {
    Token {
        #[serde(flatten)]
        record: &'a TokenRecord,
        observed_at: DateTime<Utc>,
    },
    Order {
        symbol: &'a str,
        #[serde(flatten)]
        level: &'a OrderBookLevel,
        crawled_at: DateTime<Utc>,
    },
}

pub struct BackupWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl BackupWriter {
    pub fn file_name(started: DateTime<Utc>) -> String {
        format!("premarket_backup_{}.jsonl", started.format("%Y%m%d_%H%M%S"))
    }

    pub async fn create(dir: &Path, started: DateTime<Utc>) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(Self::file_name(started));
        let file = File::create(&path).await?;
        info!(path = %path.display(), "Backup artifact opened");
        Ok(Self { path, out: BufWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_token(&mut self, record: &TokenRecord, observed_at: DateTime<Utc>) -> Result<()> {
        self.write_line(&BackupLine::Token { record, observed_at }).await
    }

    /// Appends one snapshot and flushes, so the rows are on disk before the
    /// database sees them.
    pub async fn write_order_book(
        &mut self,
        symbol: &str,
        levels: &[OrderBookLevel],
        crawled_at: DateTime<Utc>,
    ) -> Result<()> {
        for level in levels {
            self.write_line(&BackupLine::Order { symbol, level, crawled_at }).await?;
        }
        self.flush().await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.out.flush().await?;
        Ok(())
    }

    async fn write_line(&mut self, line: &BackupLine<'_>) -> Result<()> {
        let mut buf = serde_json::to_vec(line)?;
        buf.push(b'\n');
        self.out.write_all(&buf).await?;
        Ok(())
    }
}
