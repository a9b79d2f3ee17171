use crate::config::ScraperConfig;
use crate::error::{WatchError, WatchResult};
use std::time::Duration;
use tracing::debug;

/// Single-shot page fetcher. Retrying is left to the external scheduler.
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> WatchResult<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .map_err(|e| WatchError::Scrape(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { inner })
    }

    /// Fetch a URL as text. Timeouts, transport errors and non-2xx statuses
    /// all surface as `WatchError::Scrape`.
    pub async fn get_text(&self, url: &str) -> WatchResult<String> {
        debug!("GET {}", url);

        let resp = self.inner.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                WatchError::Scrape(format!("timeout fetching {url}"))
            } else {
                WatchError::Scrape(format!("network error fetching {url}: {e}"))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(WatchError::Scrape(format!("HTTP {status} from {url}")));
        }

        resp.text()
            .await
            .map_err(|e| WatchError::Scrape(format!("failed to read response body: {e}")))
    }
}
