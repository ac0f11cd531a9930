//! Rendering collaborator: everything that turns a URL into DOM text.
//!
//! The scraping code only sees page text and a named pagination control, so
//! layout drift stays inside `scrape` and the browser stays a black box.

pub mod http;
pub mod webdriver;

#[cfg(test)]
pub mod scripted;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, RendererKind};
use crate::error::Result;
use crate::types::OrderSide;

pub use http::HttpRenderer;
pub use webdriver::WebDriverRenderer;

/// A control the scraper can activate on a loaded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Pagination control of one order-book side.
    GoToPage { side: OrderSide, page: u32 },
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::GoToPage { side, page } => write!(f, "{side} page {page}"),
        }
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load `url` and return a live page.
    async fn open(&self, url: &str) -> Result<Box<dyn Page>>;
}

#[async_trait]
pub trait Page: Send {
    /// Current DOM text.
    async fn content(&mut self) -> Result<String>;

    /// Activate `control` and return the DOM text after it settles.
    async fn interact(&mut self, control: &Control) -> Result<String>;

    /// Release browser resources. Never fails; problems are logged.
    async fn close(self: Box<Self>);
}

pub fn create_renderer(cfg: &Config) -> Result<Arc<dyn Renderer>> {
    Ok(match cfg.renderer {
        RendererKind::WebDriver => Arc::new(WebDriverRenderer::new(
            &cfg.webdriver_url,
            cfg.request_timeout,
            cfg.settle,
        )?),
        RendererKind::Http => Arc::new(HttpRenderer::new(cfg.request_timeout)?),
    })
}
