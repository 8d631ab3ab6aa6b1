//! The "send-notification" admin action.
use anyhow::{Context, Result};
use std::fmt;
use tracing::{error, instrument, warn};

use crate::broadcast::{broadcast_with, BroadcastError};
use crate::db::{self, Pool};
use crate::model::BroadcastSummary;
use crate::telegram::MessageSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Success,
    Warning,
    Error,
}

impl MessageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageLevel::Success => "success",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        }
    }
}

/// What the operator sees after triggering the action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub level: MessageLevel,
    pub message: String,
    pub summary: Option<BroadcastSummary>,
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level.as_str(), self.message)
    }
}

/// Broadcast notification `notification_id` to every client.
///
/// Database failures are returned as errors; a missing record and anything
/// the broadcast itself reports become an operator message.
#[instrument(skip_all, fields(notification_id = notification_id))]
pub async fn send_notification(
    pool: &Pool,
    sender: &dyn MessageSender,
    notification_id: i64,
    concurrency: usize,
) -> Result<ActionOutcome> {
    let Some(notification) = db::get_notification(pool, notification_id).await? else {
        warn!(notification_id, "notification not found");
        return Ok(render_not_found(notification_id));
    };
    let recipients = db::list_recipients(pool)
        .await
        .context("failed to load recipients")?;

    match broadcast_with(sender, &notification, &recipients, concurrency).await {
        Ok(summary) => Ok(render_summary(&notification.title, summary)),
        Err(err) => {
            error!(?err, "notification not sent");
            Ok(render_error(&notification.title, &err))
        }
    }
}

pub fn render_summary(title: &str, summary: BroadcastSummary) -> ActionOutcome {
    let (level, message) = if summary.attempted() == 0 {
        (
            MessageLevel::Warning,
            format!("Notification \"{title}\" not sent: there are no clients to notify."),
        )
    } else if summary.all_delivered() {
        (
            MessageLevel::Success,
            format!(
                "Notification \"{title}\" sent to all {} clients.",
                summary.delivered
            ),
        )
    } else {
        let failed: Vec<&str> = summary
            .failed_recipients
            .iter()
            .map(|r| r.as_str())
            .collect();
        (
            MessageLevel::Warning,
            format!(
                "Notification \"{title}\": {} delivered, {} failed (chat ids: {}).",
                summary.delivered,
                summary.failed,
                failed.join(", ")
            ),
        )
    };
    ActionOutcome {
        level,
        message,
        summary: Some(summary),
    }
}

pub fn render_not_found(notification_id: i64) -> ActionOutcome {
    ActionOutcome {
        level: MessageLevel::Error,
        message: format!("Notification #{notification_id} not sent: it does not exist."),
        summary: None,
    }
}

pub fn render_error(title: &str, err: &BroadcastError) -> ActionOutcome {
    ActionOutcome {
        level: MessageLevel::Error,
        message: format!("Notification \"{title}\" not sent: {err}"),
        summary: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::model::{DeliveryResult, FailureReason, Recipient};
    use chrono::Utc;
    use uuid::Uuid;

    fn summary(results: Vec<(&str, DeliveryResult)>) -> BroadcastSummary {
        let results = results
            .into_iter()
            .map(|(id, r)| (Recipient::from(id), r))
            .collect();
        BroadcastSummary::from_results(Uuid::new_v4(), Utc::now(), results)
    }

    #[test]
    fn full_delivery_is_success() {
        let outcome = render_summary(
            "Welcome",
            summary(vec![("1", DeliveryResult::Delivered), ("2", DeliveryResult::Delivered)]),
        );
        assert_eq!(outcome.level, MessageLevel::Success);
        assert_eq!(outcome.message, "Notification \"Welcome\" sent to all 2 clients.");
    }

    #[test]
    fn partial_delivery_lists_failed_ids() {
        let outcome = render_summary(
            "Welcome",
            summary(vec![
                ("1", DeliveryResult::Delivered),
                (
                    "2",
                    DeliveryResult::TransientFailure(FailureReason::Transport("reset".into())),
                ),
            ]),
        );
        assert_eq!(outcome.level, MessageLevel::Warning);
        assert_eq!(
            outcome.to_string(),
            "[warning] Notification \"Welcome\": 1 delivered, 1 failed (chat ids: 2)."
        );
    }

    #[test]
    fn no_recipients_is_a_warning() {
        let outcome = render_summary("Welcome", summary(vec![]));
        assert_eq!(outcome.level, MessageLevel::Warning);
        assert!(outcome.message.contains("no clients"));
    }

    #[test]
    fn missing_notification_becomes_operator_message() {
        let outcome = render_not_found(404);
        assert_eq!(outcome.level, MessageLevel::Error);
        assert_eq!(
            outcome.to_string(),
            "[error] Notification #404 not sent: it does not exist."
        );
        assert!(outcome.summary.is_none());
    }

    #[test]
    fn configuration_error_becomes_operator_message() {
        let err = BroadcastError::Configuration(ConfigError::Invalid(
            "telegram.bot_token must be non-empty",
        ));
        let outcome = render_error("Welcome", &err);
        assert_eq!(outcome.level, MessageLevel::Error);
        assert!(outcome.message.contains("telegram.bot_token"));
        assert!(outcome.summary.is_none());
    }
}
