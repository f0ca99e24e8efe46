//! Telegram alert channel
//!
//! Best-effort outbound notifications: every failure is logged and
//! swallowed, never retried within a run, and never allowed to block
//! state persistence.

use chrono::FixedOffset;
use reqwest::Client;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::engine::SignalEvent;
use crate::types::Signal;

pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
    utc_offset_hours: i32,
}

impl TelegramNotifier {
    /// Build a notifier from config; None when credentials are absent,
    /// which disables alerting without failing the run.
    pub fn from_config(cfg: &TelegramConfig) -> Option<Self> {
        let bot_token = cfg.bot_token.clone()?;
        let chat_id = cfg.chat_id.clone()?;

        let client = Client::builder()
            .timeout(StdDuration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Some(TelegramNotifier {
            client,
            bot_token,
            chat_id,
            utc_offset_hours: cfg.alert_utc_offset_hours,
        })
    }

    /// Send one message. Errors are logged at warn and dropped.
    pub async fn notify(&self, text: &str) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("telegram alert sent");
            }
            Ok(response) => {
                warn!(status = %response.status(), "telegram alert rejected");
            }
            Err(e) => {
                warn!(error = %e, "failed to send telegram alert");
            }
        }
    }

    /// Send the message for one lifecycle event.
    pub async fn notify_event(&self, event: &SignalEvent) {
        let text = self.format_event(event);
        self.notify(&text).await;
    }

    pub fn format_event(&self, event: &SignalEvent) -> String {
        match event {
            SignalEvent::Created(s) => self.format_new_signal(s, None),
            SignalEvent::Refined { replaced, signal } => {
                self.format_new_signal(signal, Some(replaced))
            }
            SignalEvent::Activated(s) => format!(
                "✅ Trade OPENED ({}): {} {} @ {:.2}",
                s.direction, s.symbol, s.timeframe, s.entry
            ),
            SignalEvent::Won(s) => format!(
                "🎯 Trade CLOSED (TP): {} {} {}",
                s.symbol, s.timeframe, s.direction
            ),
            SignalEvent::Lost(s) => format!(
                "❌ Trade CLOSED (SL): {} {} {}",
                s.symbol, s.timeframe, s.direction
            ),
            SignalEvent::Expired(s) => format!(
                "⌛ Trade expired: {} {} {}",
                s.symbol, s.timeframe, s.direction
            ),
        }
    }

    fn format_new_signal(&self, s: &Signal, replaced: Option<&str>) -> String {
        let mut msg = format!(
            "📢 New Trade Alert!\n\
             Pair: {}\n\
             Timeframe: {}\n\
             Type: {}\n\
             Regime: {}\n\
             Entry: {:.2}\n\
             SL: {:.2}\n\
             TP1: {:.2}\n\
             TP2: {:.2}\n\
             R/R: {:.2}\n\
             Status: {}\n\
             Refinements: {}\n\
             Signal Time: {}",
            s.symbol,
            s.timeframe,
            s.direction,
            s.regime,
            s.entry,
            s.stop,
            s.target1,
            s.target2,
            s.risk_reward,
            s.status,
            s.refinements,
            self.readable_time(s),
        );
        if let Some(old_id) = replaced {
            msg.push_str(&format!("\nReplaces: {}", old_id));
        }
        msg
    }

    /// Signal time shifted into the configured local offset for readability
    fn readable_time(&self, s: &Signal) -> String {
        match FixedOffset::east_opt(self.utc_offset_hours * 3600) {
            Some(offset) => s
                .signal_time
                .with_timezone(&offset)
                .format("%a, %b %d %Y - %H:%M")
                .to_string(),
            None => s.signal_time.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Regime, SignalStatus, Symbol};
    use chrono::{TimeZone, Utc};

    fn notifier() -> TelegramNotifier {
        TelegramNotifier::from_config(&TelegramConfig {
            bot_token: Some("token".to_string()),
            chat_id: Some("chat".to_string()),
            alert_utc_offset_hours: -5,
        })
        .unwrap()
    }

    fn sample_signal() -> Signal {
        Signal {
            id: "BTCUSDT_1h_20240301_120000_L_000001".to_string(),
            symbol: Symbol::new("BTC/USDT"),
            timeframe: "1h".to_string(),
            direction: Direction::Long,
            status: SignalStatus::Pending,
            regime: Regime::StrongUp,
            entry: 50000.0,
            stop: 49250.0,
            target1: 51500.0,
            target2: 52250.0,
            risk_reward: 2.0,
            refinements: 1,
            signal_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            entry_time: None,
            exit_time: None,
            exit_reason: None,
        }
    }

    #[test]
    fn test_missing_credentials_disable_notifier() {
        assert!(TelegramNotifier::from_config(&TelegramConfig::default()).is_none());
    }

    #[test]
    fn test_new_signal_message_contents() {
        let msg = notifier().format_event(&SignalEvent::Created(sample_signal()));
        assert!(msg.contains("New Trade Alert"));
        assert!(msg.contains("Pair: BTC/USDT"));
        assert!(msg.contains("Entry: 50000.00"));
        assert!(msg.contains("SL: 49250.00"));
        assert!(msg.contains("Refinements: 1"));
        // UTC-5 rendering of 12:00 UTC
        assert!(msg.contains("07:00"));
    }

    #[test]
    fn test_lifecycle_messages() {
        let n = notifier();
        let s = sample_signal();
        assert!(n
            .format_event(&SignalEvent::Activated(s.clone()))
            .contains("OPENED"));
        assert!(n.format_event(&SignalEvent::Won(s.clone())).contains("TP"));
        assert!(n.format_event(&SignalEvent::Lost(s.clone())).contains("SL"));
        assert!(n.format_event(&SignalEvent::Expired(s)).contains("expired"));
    }
}
