/// Outbound notifications with per-(kind, date) dedup (§6, §8 invariant
/// 7, C13). Grounded on the teacher's `EventBus` idempotency-key dedup
/// (`processed_events: HashSet`), narrowed from per-event-instance to
/// per-(kind, date) since only the once-per-day kinds need suppression.
use async_trait::async_trait;
use tracing::{info, warn};

use crate::types::{AlertKind, DailyMarker};

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, kind: AlertKind, message: &str) -> crate::error::Result<()>;
}

/// Emits structured log lines in place of a real notification channel
/// (email/Slack webhook); swapping those in means implementing `AlertSink`
/// against `reqwest`, not touching the dedup logic below.
pub struct LoggingAlertSink;

#[async_trait]
impl AlertSink for LoggingAlertSink {
    async fn send(&self, kind: AlertKind, message: &str) -> crate::error::Result<()> {
        match kind {
            AlertKind::HealthEmergency | AlertKind::HealthWarning => warn!(kind = kind.as_str(), "{message}"),
            _ => info!(kind = kind.as_str(), "{message}"),
        }
        Ok(())
    }
}

/// Wraps any `AlertSink` with the once-per-day dedup rule, checked and
/// recorded against the shared `DailyMarker`.
pub async fn send_deduped(
    sink: &dyn AlertSink,
    marker: &mut DailyMarker,
    kind: AlertKind,
    message: &str,
) -> crate::error::Result<()> {
    if kind.is_once_per_day() && marker.alert_sent(kind) {
        return Err(crate::error::TradingError::DuplicateAlert(kind.as_str().to_string()));
    }

    sink.send(kind, message).await?;

    if kind.is_once_per_day() {
        marker.mark_alert_sent(kind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_send_of_a_once_per_day_kind_is_suppressed() {
        let sink = LoggingAlertSink;
        let mut marker = DailyMarker::new("2026-07-28".to_string());

        send_deduped(&sink, &mut marker, AlertKind::Morning, "good morning").await.unwrap();
        let second = send_deduped(&sink, &mut marker, AlertKind::Morning, "good morning again").await;
        assert!(matches!(second, Err(crate::error::TradingError::DuplicateAlert(_))));
    }

    #[tokio::test]
    async fn individual_exit_alerts_are_not_deduped() {
        let sink = LoggingAlertSink;
        let mut marker = DailyMarker::new("2026-07-28".to_string());

        send_deduped(&sink, &mut marker, AlertKind::IndividualExit, "exit 1").await.unwrap();
        send_deduped(&sink, &mut marker, AlertKind::IndividualExit, "exit 2").await.unwrap();
    }
}
