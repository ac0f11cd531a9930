use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tracing::debug;

use crate::config::{ACCEPT_LANGUAGE as LANGUAGES, USER_AGENT};
use crate::error::{AppError, Result};
use crate::render::{Control, Page, Renderer};

/// Plain GET fallback. Sees only what the server renders, so only the first
/// page of each order-book side is reachable.
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(LANGUAGES));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn open(&self, url: &str) -> Result<Box<dyn Page>> {
        let html = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(url, bytes = html.len(), "static page fetched");
        Ok(Box::new(StaticPage { url: url.to_string(), html }))
    }
}

struct StaticPage {
    url: String,
    html: String,
}

#[async_trait]
impl Page for StaticPage {
    async fn content(&mut self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn interact(&mut self, control: &Control) -> Result<String> {
        Err(AppError::Fetch(format!(
            "{control} needs a browser; {} was fetched as static HTML",
            self.url
        )))
    }

    async fn close(self: Box<Self>) {}
}
