use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Minute-resolution local timestamp format stored in history.
pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

// ── Quote ─────────────────────────────────────────────────────────────────────

/// Buy/sell pair as displayed on the source page, e.g. "8.550.000".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub buy: String,
    pub sell: String,
}

impl Quote {
    pub fn new(buy: impl Into<String>, sell: impl Into<String>) -> Self {
        Self { buy: buy.into(), sell: sell.into() }
    }
}

// ── Price record ──────────────────────────────────────────────────────────────

/// One observation in the history log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    #[serde(rename = "time")]
    pub timestamp_local: String,
    pub buy: String,
    pub sell: String,
}

impl PriceRecord {
    /// Stamp a quote with the zoned wall-clock time, truncated to the minute.
    pub fn observed<Tz: TimeZone>(quote: &Quote, at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            timestamp_local: at.format(RECORD_TIME_FORMAT).to_string(),
            buy: quote.buy.clone(),
            sell: quote.sell.clone(),
        }
    }

    pub fn buy_value(&self) -> Option<i64> {
        parse_price(&self.buy)
    }

    pub fn sell_value(&self) -> Option<i64> {
        parse_price(&self.sell)
    }

    /// Raw-token comparison, the source of truth for "did the price change".
    pub fn same_price_as(&self, other: &PriceRecord) -> bool {
        self.buy == other.buy && self.sell == other.sell
    }
}

// ── Run state ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    #[serde(rename = "buy", default)]
    pub last_buy: Option<String>,
    #[serde(rename = "sell", default)]
    pub last_sell: Option<String>,
    /// Hour in 0..=23 of the last heartbeat.
    #[serde(alias = "lastHourlyNotifyHour", default)]
    pub last_notified_hour: Option<u32>,
}

impl RunState {
    pub fn price_differs(&self, quote: &Quote) -> bool {
        self.last_buy.as_deref() != Some(quote.buy.as_str())
            || self.last_sell.as_deref() != Some(quote.sell.as_str())
    }
}

// ── Canonical parse ───────────────────────────────────────────────────────────

/// Keep ASCII digits only and read them as an integer in the smallest
/// currency unit. "85.200.000đ" → 85200000 | "N/A" → None.
pub fn parse_price(s: &str) -> Option<i64> {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
