use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::USER_AGENT;
use crate::error::{AppError, Result};
use crate::render::{Control, Page, Renderer};
use crate::scrape::order_book::table_marker;

/// Clicks page `arguments[1]` (or "next" when the number is not rendered yet)
/// in the pagination wrapper that follows the table matching `arguments[0]`.
/// Returns false when no such control exists.
const GO_TO_PAGE_SCRIPT: &str = r#"
const [marker, page] = arguments;
const table = document.querySelector(`[class*='${marker}']`);
if (!table) { return false; }
let pager = table.querySelector("[class*='paginationWrapper'], .ant-pagination");
for (let node = table; node && !pager; node = node.parentElement) {
  for (let sib = node.nextElementSibling; sib && !pager; sib = sib.nextElementSibling) {
    if (sib.matches("[class*='paginationWrapper'], .ant-pagination")) { pager = sib; }
    else { pager = sib.querySelector("[class*='paginationWrapper'], .ant-pagination"); }
  }
}
if (!pager) { return false; }
const target = pager.querySelector(`li[title='${page}']`)
  || pager.querySelector(".ant-pagination-next:not(.ant-pagination-disabled)");
if (!target) { return false; }
target.click();
return true;
"#;

/// Drives headless Chrome through a W3C WebDriver endpoint (chromedriver).
pub struct WebDriverRenderer {
    client: reqwest::Client,
    endpoint: String,
    settle: Duration,
}

impl WebDriverRenderer {
    pub fn new(endpoint: &str, timeout: Duration, settle: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            settle,
        })
    }

    fn capabilities() -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--no-sandbox",
                            "--disable-dev-shm-usage",
                            "--disable-gpu",
                            "--window-size=1920,1080",
                            format!("--user-agent={USER_AGENT}"),
                        ]
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn open(&self, url: &str) -> Result<Box<dyn Page>> {
        let created = command(
            &self.client,
            Method::POST,
            &format!("{}/session", self.endpoint),
            Some(&Self::capabilities()),
        )
        .await?;
        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Fetch("webdriver returned no sessionId".to_string()))?;

        // Built before navigating so a cancelled open still ends the session.
        let page = WebDriverPage {
            client: self.client.clone(),
            session: format!("{}/session/{session_id}", self.endpoint),
            settle: self.settle,
            closed: false,
        };

        let navigated = command(
            &page.client,
            Method::POST,
            &format!("{}/url", page.session),
            Some(&json!({ "url": url })),
        )
        .await;
        if let Err(e) = navigated {
            Box::new(page).close().await;
            return Err(e);
        }

        // Client-side rendering fills the lists after navigation returns.
        tokio::time::sleep(self.settle).await;
        debug!(url, session = session_id, "page opened");
        Ok(Box::new(page))
    }
}

struct WebDriverPage {
    client: reqwest::Client,
    /// `{endpoint}/session/{id}`
    session: String,
    settle: Duration,
    closed: bool,
}

impl Drop for WebDriverPage {
    /// Pages dropped without `close` (a timed-out open, a cancelled crawl)
    /// delete their session in the background.
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(session = %self.session, "webdriver session dropped outside the runtime; left open");
            return;
        };
        let client = self.client.clone();
        let session = std::mem::take(&mut self.session);
        handle.spawn(async move {
            match command(&client, Method::DELETE, &session, None).await {
                Ok(_) => debug!(%session, "abandoned webdriver session deleted"),
                Err(e) => warn!(%session, "failed to delete abandoned webdriver session: {e}"),
            }
        });
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn content(&mut self) -> Result<String> {
        let source = command(&self.client, Method::GET, &format!("{}/source", self.session), None).await?;
        source
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::Fetch("webdriver page source was not a string".to_string()))
    }

    async fn interact(&mut self, control: &Control) -> Result<String> {
        let Control::GoToPage { side, page } = *control;
        let clicked = command(
            &self.client,
            Method::POST,
            &format!("{}/execute/sync", self.session),
            Some(&json!({ "script": GO_TO_PAGE_SCRIPT, "args": [table_marker(side), page] })),
        )
        .await?;
        if clicked.as_bool() != Some(true) {
            return Err(AppError::Fetch(format!("{control} control not found")));
        }
        tokio::time::sleep(self.settle).await;
        self.content().await
    }

    async fn close(self: Box<Self>) {
        let mut page = self;
        if let Err(e) = command(&page.client, Method::DELETE, &page.session, None).await {
            warn!(session = %page.session, "failed to close webdriver session: {e}");
        }
        page.closed = true;
    }
}

/// Send one WebDriver command and unwrap the `value` member of the reply.
async fn command(client: &reqwest::Client, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
    let mut req = client.request(method, url);
    if let Some(body) = body {
        req = req.json(body);
    }
    let resp = req.send().await?;
    let status = resp.status();
    let mut reply: Value = resp.json().await?;
    let value = reply.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(AppError::Fetch(format!("webdriver {status} {error}: {message}")));
    }
    Ok(value)
}
