//! Run orchestrator: one poll per invocation (cron use).
//!
//!   1. Fetch the quote. On failure nothing on disk is touched.
//!   2. Load state + history (missing/corrupt files read as a first run).
//!   3. Append the observation to history and persist it.
//!   4. Evaluate the notification policy.
//!   5. If due: send the text, then the chart of the trailing window.
//!      Chart problems skip the image; delivery failures abort the run.
//!   6. Save the new state.
//!
//! A delivery failure leaves the prior state on disk, so the next run sends
//! the same notification again. The history append is not rolled back.
//!
//! With persistence off (dry runs) steps 3 and 6 stay in memory: neither
//! file is written, so a rehearsal cannot consume the hour's heartbeat.

use crate::chart::ChartRenderer;
use crate::config::AppConfig;
use crate::models::PriceRecord;
use crate::notifier::Notifier;
use crate::policy::{NotificationKind, NotificationPolicy};
use crate::scraper::PriceSource;
use crate::storage::{HistoryStore, StateStore};
use anyhow::{Context, Result};
use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

pub struct Pipeline {
    source: Box<dyn PriceSource>,
    notifier: Box<dyn Notifier>,
    state: StateStore,
    history: HistoryStore,
    policy: NotificationPolicy,
    renderer: Option<ChartRenderer>,
    chart_window: usize,
    product_name: String,
    persist: bool,
}

impl Pipeline {
    pub fn new(
        config: &AppConfig,
        source: Box<dyn PriceSource>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            notifier,
            state: StateStore::new(&config.storage.state_path),
            history: HistoryStore::open(&config.storage.history_path)
                .with_cap(config.storage.max_history),
            policy: NotificationPolicy::new(
                config.policy.heartbeat_window_minutes,
                &config.policy.product_name,
            ),
            renderer: config.chart.enabled.then(|| ChartRenderer::from_config(&config.chart)),
            chart_window: config.chart.window,
            product_name: config.policy.product_name.clone(),
            persist: true,
        }
    }

    /// Keep history and state changes in memory only.
    pub fn with_persistence(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// One poll at wall-clock time `now`.
    pub async fn run(&mut self, now: DateTime<Tz>) -> Result<RunReport> {
        let quote = self.source.fetch_quote().await.context("Price fetch failed")?;

        let prior = self.state.load();
        debug!("Prior state: {:?}", prior);

        let record = PriceRecord::observed(&quote, &now);
        if self.persist {
            self.history
                .append(record)
                .context("Failed to append to history")?;
        } else {
            self.history.push(record);
        }

        let decision = self.policy.evaluate(&quote, &prior, now.naive_local());
        info!(
            "Decision at {}: {} (notify: {})",
            now.format("%H:%M"),
            decision.kind,
            decision.notify()
        );

        let mut chart_sent = false;
        if let Some(message) = &decision.message {
            self.notifier
                .send_text(message)
                .await
                .context("Failed to deliver message")?;
            chart_sent = self.send_chart().await?;
        }

        if self.persist {
            self.state
                .save(&decision.new_state)
                .context("Failed to save state")?;
        } else {
            info!("Not persisting: would save {:?}", decision.new_state);
        }

        Ok(RunReport {
            kind: decision.kind,
            history_len: self.history.len(),
            chart_sent,
        })
    }

    /// Returns whether an image went out. Only delivery errors propagate.
    async fn send_chart(&self) -> Result<bool> {
        let Some(renderer) = &self.renderer else {
            return Ok(false);
        };

        let png = match self
            .history
            .recent_window(self.chart_window)
            .and_then(|window| renderer.render(window))
        {
            Ok(png) => png,
            Err(e) if e.is_chart_only() => {
                warn!("Skipping chart: {}", e);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let points = self.history.len().min(self.chart_window);
        let caption = format!("📊 Biểu đồ giá {} ({} lần gần nhất)", self.product_name, points);
        self.notifier
            .send_image(png, &caption)
            .await
            .context("Failed to deliver chart")?;
        Ok(true)
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub kind: NotificationKind,
    pub history_len: usize,
    pub chart_sent: bool,
}
