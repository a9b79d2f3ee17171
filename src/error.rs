use std::path::PathBuf;
use thiserror::Error;

/// Failures the poller distinguishes between. Everything above the domain
/// layer wraps these in `anyhow` with context.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Target row missing, non-2xx response, transport error or timeout.
    #[error("scrape failed: {0}")]
    Scrape(String),

    #[error("record {index} has a non-numeric price {value:?}")]
    InvalidPriceData { index: usize, value: String },

    #[error("need at least 2 records to draw a chart, have {have}")]
    InsufficientData { have: usize },

    #[error("chart encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("storage error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WatchError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage { path: path.into(), source }
    }

    /// Fatal errors end the run with a non-zero exit; chart-only errors are
    /// recovered by skipping the image.
    pub fn is_chart_only(&self) -> bool {
        matches!(
            self,
            Self::InvalidPriceData { .. } | Self::InsufficientData { .. } | Self::Encode(_)
        )
    }
}

pub type WatchResult<T> = std::result::Result<T, WatchError>;
