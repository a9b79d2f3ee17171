//! Decides, once per poll, whether a message goes out.
//!
//! Rules, first match wins:
//!   1. Heartbeat: minute < window and no heartbeat yet for this hour.
//!   2. Price change: buy or sell token differs from the last observation.
//!   3. Nothing.
//!
//! A change seen inside the heartbeat window is reported by the heartbeat.
//! The observed price is always carried into the new state.

use crate::models::{Quote, RunState};
use chrono::{NaiveDateTime, Timelike};

const MESSAGE_TIME_FORMAT: &str = "%H:%M %d/%m/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    None,
    Heartbeat,
    PriceChange,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Heartbeat => "heartbeat",
            Self::PriceChange => "price-change",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub kind: NotificationKind,
    pub message: Option<String>,
    pub new_state: RunState,
}

impl Decision {
    pub fn notify(&self) -> bool {
        self.message.is_some()
    }
}

pub struct NotificationPolicy {
    heartbeat_window_minutes: u32,
    product_name: String,
}

impl NotificationPolicy {
    pub fn new(heartbeat_window_minutes: u32, product_name: impl Into<String>) -> Self {
        Self {
            heartbeat_window_minutes,
            product_name: product_name.into(),
        }
    }

    /// `now` is wall-clock time in the configured local zone.
    pub fn evaluate(&self, quote: &Quote, prior: &RunState, now: NaiveDateTime) -> Decision {
        let hour = now.hour();
        let mut new_state = RunState {
            last_buy: Some(quote.buy.clone()),
            last_sell: Some(quote.sell.clone()),
            last_notified_hour: prior.last_notified_hour,
        };

        let in_window = now.minute() < self.heartbeat_window_minutes;
        let (kind, message) = if in_window && prior.last_notified_hour != Some(hour) {
            new_state.last_notified_hour = Some(hour);
            (NotificationKind::Heartbeat, Some(self.heartbeat_message(quote, now)))
        } else if prior.price_differs(quote) {
            (NotificationKind::PriceChange, Some(self.change_message(quote, prior, now)))
        } else {
            (NotificationKind::None, None)
        };

        Decision { kind, message, new_state }
    }

    fn heartbeat_message(&self, quote: &Quote, now: NaiveDateTime) -> String {
        format!(
            "📢 Giá {} hiện tại\n\nMua: {}\nBán: {}\n\n⏰ {}",
            self.product_name,
            quote.buy,
            quote.sell,
            now.format(MESSAGE_TIME_FORMAT),
        )
    }

    fn change_message(&self, quote: &Quote, prior: &RunState, now: NaiveDateTime) -> String {
        format!(
            "📢 Giá {} thay đổi\n\n🔻 Trước:\nMua: {}\nBán: {}\n\n🔺 Hiện tại:\nMua: {}\nBán: {}\n\n⏰ {}",
            self.product_name,
            prior.last_buy.as_deref().unwrap_or("—"),
            prior.last_sell.as_deref().unwrap_or("—"),
            quote.buy,
            quote.sell,
            now.format(MESSAGE_TIME_FORMAT),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn policy() -> NotificationPolicy {
        NotificationPolicy::new(5, "vàng 98")
    }

    fn state(buy: &str, sell: &str, hour: Option<u32>) -> RunState {
        RunState {
            last_buy: Some(buy.into()),
            last_sell: Some(sell.into()),
            last_notified_hour: hour,
        }
    }

    #[test]
    fn test_heartbeat_on_new_hour() {
        let prior = state("85000000", "86000000", Some(7));
        let quote = Quote::new("85500000", "86500000");
        let d = policy().evaluate(&quote, &prior, at(8, 2));

        assert_eq!(d.kind, NotificationKind::Heartbeat);
        let msg = d.message.unwrap();
        assert!(msg.contains("Mua: 85500000"));
        assert!(msg.contains("Bán: 86500000"));
        assert!(msg.contains("08:02 01/01/2024"));
        assert_eq!(d.new_state, state("85500000", "86500000", Some(8)));
    }

    #[test]
    fn test_heartbeat_fires_once_per_hour() {
        let p = policy();
        let quote = Quote::new("1", "2");
        let first = p.evaluate(&quote, &state("1", "2", Some(7)), at(8, 0));
        assert_eq!(first.kind, NotificationKind::Heartbeat);

        let second = p.evaluate(&quote, &first.new_state, at(8, 4));
        assert_eq!(second.kind, NotificationKind::None);
        assert!(!second.notify());
    }

    #[test]
    fn test_heartbeat_fires_without_price_change() {
        let quote = Quote::new("1", "2");
        let d = policy().evaluate(&quote, &state("1", "2", Some(23)), at(0, 3));
        assert_eq!(d.kind, NotificationKind::Heartbeat);
        assert_eq!(d.new_state.last_notified_hour, Some(0));
    }

    #[test]
    fn test_change_outside_window() {
        let prior = state("85000000", "86000000", Some(8));
        let quote = Quote::new("85000000", "86100000");
        let d = policy().evaluate(&quote, &prior, at(8, 30));

        assert_eq!(d.kind, NotificationKind::PriceChange);
        let msg = d.message.unwrap();
        assert!(msg.contains("Bán: 86000000"));
        assert!(msg.contains("Bán: 86100000"));
        assert_eq!(d.new_state, state("85000000", "86100000", Some(8)));
    }

    #[test]
    fn test_change_inside_window_reported_as_heartbeat() {
        let prior = state("1", "2", Some(7));
        let d = policy().evaluate(&Quote::new("3", "4"), &prior, at(8, 1));
        assert_eq!(d.kind, NotificationKind::Heartbeat);
    }

    #[test]
    fn test_change_inside_window_after_heartbeat_sent() {
        let prior = state("1", "2", Some(8));
        let d = policy().evaluate(&Quote::new("3", "2"), &prior, at(8, 1));
        assert_eq!(d.kind, NotificationKind::PriceChange);
    }

    #[test]
    fn test_unchanged_outside_window_is_idempotent() {
        let p = policy();
        let quote = Quote::new("1", "2");
        let first = p.evaluate(&quote, &state("0", "2", Some(8)), at(8, 40));
        assert_eq!(first.kind, NotificationKind::PriceChange);

        let second = p.evaluate(&quote, &first.new_state, at(8, 40));
        assert_eq!(second.kind, NotificationKind::None);
        assert_eq!(second.message, None);
        assert_eq!(second.new_state, first.new_state);
    }

    #[test]
    fn test_first_run_reports_change_with_placeholders() {
        let d = policy().evaluate(&Quote::new("1", "2"), &RunState::default(), at(9, 30));
        assert_eq!(d.kind, NotificationKind::PriceChange);
        assert!(d.message.unwrap().contains("Mua: —"));
        assert_eq!(d.new_state.last_notified_hour, None);
    }

    #[test]
    fn test_first_run_inside_window_is_heartbeat() {
        let d = policy().evaluate(&Quote::new("1", "2"), &RunState::default(), at(0, 0));
        assert_eq!(d.kind, NotificationKind::Heartbeat);
        assert_eq!(d.new_state.last_notified_hour, Some(0));
    }

    #[test]
    fn test_display_token_drift_counts_as_change() {
        let prior = state("85.200.000đ", "86.000.000đ", Some(8));
        let d = policy().evaluate(&Quote::new("85.200.000", "86.000.000đ"), &prior, at(8, 20));
        assert_eq!(d.kind, NotificationKind::PriceChange);
    }

    #[test]
    fn test_window_edge_is_exclusive() {
        let prior = state("1", "2", Some(7));
        let d = policy().evaluate(&Quote::new("1", "2"), &prior, at(8, 5));
        assert_eq!(d.kind, NotificationKind::None);
    }
}
