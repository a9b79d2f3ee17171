use crate::config::TelegramConfig;
use crate::error::{WatchError, WatchResult};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

// ── Sink trait ────────────────────────────────────────────────────────────────

/// Outbound message channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, message: &str) -> WatchResult<()>;
    async fn send_image(&self, png: Vec<u8>, caption: &str) -> WatchResult<()>;
}

// ── Telegram ──────────────────────────────────────────────────────────────────

/// Bot API envelope; only the status fields matter here.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Self> {
        let (token, chat_id) = config.credentials()?;
        url::Url::parse(&config.api_base)
            .with_context(|| format!("telegram.api_base is not a URL: {}", config.api_base))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/bot{}", config.api_base.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.endpoint, method)
    }

    /// Map transport errors, HTTP status and the `ok` flag onto one error.
    /// The bot token is part of the URL, so reqwest errors are stripped of it.
    async fn check(method: &str, sent: reqwest::Result<reqwest::Response>) -> WatchResult<()> {
        let resp = sent.map_err(|e| WatchError::Delivery(format!("{method}: {}", e.without_url())))?;
        let status = resp.status();
        let body: Option<ApiResponse> = resp.json().await.ok();

        match body {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(ApiResponse { description, .. }) => Err(WatchError::Delivery(format!(
                "{method}: HTTP {status}: {}",
                description.unwrap_or_else(|| "no description".into())
            ))),
            None => Err(WatchError::Delivery(format!("{method}: HTTP {status}, unreadable body"))),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, message: &str) -> WatchResult<()> {
        debug!("sendMessage ({} chars)", message.chars().count());
        let sent = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({ "chat_id": self.chat_id, "text": message }))
            .send()
            .await;
        Self::check("sendMessage", sent).await?;
        info!("Message delivered");
        Ok(())
    }

    async fn send_image(&self, png: Vec<u8>, caption: &str) -> WatchResult<()> {
        debug!("sendPhoto ({} bytes)", png.len());
        let photo = Part::bytes(png)
            .file_name("chart.png")
            .mime_str("image/png")
            .map_err(|e| WatchError::Delivery(format!("sendPhoto: {e}")))?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let sent = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await;
        Self::check("sendPhoto", sent).await?;
        info!("Chart delivered");
        Ok(())
    }
}

// ── Dry run ───────────────────────────────────────────────────────────────────

/// Logs messages instead of sending them; images land in `image_path`.
pub struct LogNotifier {
    image_path: PathBuf,
}

impl LogNotifier {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self { image_path: image_path.into() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, message: &str) -> WatchResult<()> {
        info!("[dry-run] message:\n{}", message);
        Ok(())
    }

    async fn send_image(&self, png: Vec<u8>, caption: &str) -> WatchResult<()> {
        tokio::fs::write(&self.image_path, &png)
            .await
            .map_err(|e| WatchError::storage(&self.image_path, e))?;
        info!("[dry-run] image {:?} ({} bytes): {}", self.image_path, png.len(), caption);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TelegramConfig {
        TelegramConfig {
            bot_token: Some("123:abc".into()),
            chat_id: Some("-100200".into()),
            api_base: "https://api.telegram.org/".into(),
            ..TelegramConfig::default()
        }
    }

    #[test]
    fn test_method_urls() {
        let n = TelegramNotifier::new(&config()).unwrap();
        assert_eq!(n.method_url("sendMessage"), "https://api.telegram.org/bot123:abc/sendMessage");
        assert_eq!(n.method_url("sendPhoto"), "https://api.telegram.org/bot123:abc/sendPhoto");
    }

    #[test]
    fn test_requires_credentials() {
        let cfg = TelegramConfig { chat_id: None, ..config() };
        assert!(TelegramNotifier::new(&cfg).is_err());
    }

    #[test]
    fn test_api_response_shape() {
        let r: ApiResponse =
            serde_json::from_str(r#"{"ok":false,"error_code":400,"description":"chat not found"}"#)
                .unwrap();
        assert!(!r.ok);
        assert_eq!(r.description.as_deref(), Some("chat not found"));
    }

    #[test]
    fn test_log_notifier_writes_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        let n = LogNotifier::new(&path);
        tokio_test::block_on(async {
            tokio_test::assert_ok!(n.send_text("hello").await);
            tokio_test::assert_ok!(n.send_image(vec![1, 2, 3], "caption").await);
        });
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }
}
