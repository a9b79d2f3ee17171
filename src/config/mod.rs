use anyhow::{Context, Result, anyhow, ensure};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub storage: StorageConfig,
    pub policy: PolicyConfig,
    pub chart: ChartConfig,
    pub telegram: TelegramConfig,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub url: String,
    /// Text matched against the first cell of each price table row.
    pub product_label: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_path: PathBuf,
    pub history_path: PathBuf,
    /// Keep only the newest N records on disk. Unbounded when unset.
    pub max_history: Option<usize>,
}

/// Notification policy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub heartbeat_window_minutes: u32,
    pub timezone: String,
    pub product_name: String,
}

/// Chart configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChartConfig {
    pub enabled: bool,
    pub window: usize,
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub title: String,
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            url: "https://kimkhanhviethung.vn/tra-cuu-gia-vang.html".to_string(),
            product_label: "Nhẫn Khâu 98".to_string(),
            timeout_secs: 20,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("data.json"),
            history_path: PathBuf::from("history.json"),
            max_history: None,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            heartbeat_window_minutes: 5,
            timezone: "Asia/Ho_Chi_Minh".to_string(),
            product_name: "vàng 98".to_string(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 24,
            width: 900,
            height: 500,
            margin: 50,
            title: "Gia vang 98".to_string(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 30,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("GOLD").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        let mut app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        app_cfg.telegram.fill_from_legacy_env();
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.scraper.url)
            .with_context(|| format!("scraper.url is not a URL: {}", self.scraper.url))?;
        ensure!(self.scraper.timeout_secs > 0, "scraper.timeout_secs must be positive");
        ensure!(
            (1..=60).contains(&self.policy.heartbeat_window_minutes),
            "policy.heartbeat_window_minutes must be within 1..=60"
        );
        self.policy.tz()?;
        ensure!(self.chart.window >= 2, "chart.window must be at least 2");
        ensure!(
            self.chart.width > self.chart.margin * 2 && self.chart.height > self.chart.margin * 2,
            "chart.margin leaves no room to plot"
        );
        if let Some(cap) = self.storage.max_history {
            ensure!(cap >= self.chart.window, "storage.max_history must cover chart.window");
        }
        Ok(())
    }
}

impl PolicyConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("policy.timezone {:?}: {}", self.timezone, e))
    }
}

impl TelegramConfig {
    /// Plain `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID` fill whatever the
    /// layered config left empty.
    fn fill_from_legacy_env(&mut self) {
        if self.bot_token.is_none() {
            self.bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        }
        if self.chat_id.is_none() {
            self.chat_id = std::env::var("TELEGRAM_CHAT_ID").ok();
        }
    }

    pub fn credentials(&self) -> Result<(&str, &str)> {
        let token = self
            .bot_token
            .as_deref()
            .filter(|s| !s.is_empty())
            .context("telegram.bot_token is not set (GOLD__TELEGRAM__BOT_TOKEN or TELEGRAM_BOT_TOKEN)")?;
        let chat = self
            .chat_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .context("telegram.chat_id is not set (GOLD__TELEGRAM__CHAT_ID or TELEGRAM_CHAT_ID)")?;
        Ok((token, chat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.policy.tz().unwrap(), chrono_tz::Asia::Ho_Chi_Minh);
        assert_eq!(cfg.scraper.timeout_secs, 20);
        assert_eq!(cfg.chart.window, 24);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.policy.timezone = "Mars/Olympus".into();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.policy.heartbeat_window_minutes = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.storage.max_history = Some(10);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[policy]\nheartbeat_window_minutes = 10\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.policy.heartbeat_window_minutes, 10);
        assert_eq!(cfg.policy.timezone, "Asia/Ho_Chi_Minh");
        assert_eq!(cfg.storage.history_path, PathBuf::from("history.json"));
    }

    #[test]
    fn test_missing_credentials() {
        let cfg = TelegramConfig::default();
        assert!(cfg.credentials().is_err());
        let cfg = TelegramConfig {
            bot_token: Some("123:abc".into()),
            chat_id: Some("-100".into()),
            ..TelegramConfig::default()
        };
        assert_eq!(cfg.credentials().unwrap(), ("123:abc", "-100"));
    }
}
