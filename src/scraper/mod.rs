pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::error::{WatchError, WatchResult};
use crate::models::Quote;
use async_trait::async_trait;
use tracing::{debug, info};

use self::cleaner::row_to_quote;
use self::http_client::HttpClient;
use self::parsers::parse_price_table;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable price source abstraction.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_quote(&self) -> WatchResult<Quote>;
}

// ── Gold price page scraper ───────────────────────────────────────────────────

pub struct GoldPageScraper {
    client: HttpClient,
    url: String,
    product_label: String,
}

impl GoldPageScraper {
    pub fn new(config: &ScraperConfig) -> WatchResult<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            url: config.url.clone(),
            product_label: config.product_label.clone(),
        })
    }

    /// Extract the configured product's quote from a fetched page.
    pub fn quote_from_html(&self, html: &str) -> WatchResult<Quote> {
        let row = parse_price_table(html, &self.product_label)
            .map_err(|e| WatchError::Scrape(format!("{e:#}")))?;

        row.as_ref()
            .and_then(row_to_quote)
            .ok_or_else(|| WatchError::Scrape(format!("price row not found: {}", self.product_label)))
    }
}

#[async_trait]
impl PriceSource for GoldPageScraper {
    async fn fetch_quote(&self) -> WatchResult<Quote> {
        info!("Fetching {}", self.url);
        let html = self.client.get_text(&self.url).await?;
        debug!("{} bytes of HTML", html.len());

        let quote = self.quote_from_html(&html)?;
        info!("{}: buy={} sell={}", self.product_label, quote.buy, quote.sell);
        Ok(quote)
    }
}
