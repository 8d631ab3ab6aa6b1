use chrono::Utc;
use futures::{stream, FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ConfigError, TelegramConfig};
use crate::model::{BroadcastSummary, DeliveryResult, FailureReason, NotificationMessage, Recipient};
use crate::telegram::{MessageSender, TelegramClient};

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("notification {0} has an empty message body")]
    EmptyMessage(i64),
}

/// Send `message` to every recipient through the Bot API described by `endpoint`.
///
/// Fails only when the endpoint configuration or the message itself is
/// unusable, and then before any request is made. Per-recipient failures end
/// up in the returned summary.
pub async fn broadcast(
    message: &NotificationMessage,
    recipients: &[Recipient],
    endpoint: &TelegramConfig,
) -> Result<BroadcastSummary, BroadcastError> {
    let client = TelegramClient::new(endpoint)?;
    broadcast_with(&client, message, recipients, endpoint.concurrency).await
}

/// Same as [`broadcast`] with an explicit sender.
///
/// `concurrency` bounds the number of requests in flight; 1 means strictly
/// sequential. Results are always reported in recipient order.
#[instrument(skip_all, fields(notification_id = message.id, recipients = recipients.len()))]
pub async fn broadcast_with(
    sender: &dyn MessageSender,
    message: &NotificationMessage,
    recipients: &[Recipient],
    concurrency: usize,
) -> Result<BroadcastSummary, BroadcastError> {
    if message.message.trim().is_empty() {
        return Err(BroadcastError::EmptyMessage(message.id));
    }

    let broadcast_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(%broadcast_id, title = %message.title, "starting broadcast");

    let text = message.message.as_str();
    let results: Vec<(Recipient, DeliveryResult)> = stream::iter(recipients)
        .map(|recipient| async move {
            let result = attempt(sender, recipient, text, broadcast_id).await;
            (recipient.clone(), result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let summary = BroadcastSummary::from_results(broadcast_id, started_at, results);
    info!(
        %broadcast_id,
        delivered = summary.delivered,
        failed = summary.failed,
        "broadcast finished"
    );
    Ok(summary)
}

async fn attempt(
    sender: &dyn MessageSender,
    recipient: &Recipient,
    text: &str,
    broadcast_id: Uuid,
) -> DeliveryResult {
    match AssertUnwindSafe(sender.send_message(recipient, text))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => DeliveryResult::Delivered,
        Ok(Err(err)) => {
            let reason = FailureReason::from(err);
            warn!(
                %broadcast_id,
                recipient = %recipient,
                kind = reason.as_str(),
                error = %reason,
                "failed to deliver notification"
            );
            DeliveryResult::TransientFailure(reason)
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(%broadcast_id, recipient = %recipient, %reason, "sender panicked; skipping recipient");
            DeliveryResult::Aborted(reason)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "sender panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::SendError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default, Clone)]
    struct ScriptedSender {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MessageSender for ScriptedSender {
        async fn send_message(&self, recipient: &Recipient, _text: &str) -> Result<(), SendError> {
            self.calls.lock().unwrap().push(recipient.to_string());
            match recipient.as_str() {
                "panic" => panic!("sender exploded"),
                "bad" => Err(SendError::Unclassified("garbled response".into())),
                id => {
                    // Later recipients answer faster to shake up completion order.
                    let delay = 30u64.saturating_sub(id.parse::<u64>().unwrap_or(0) * 10);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok(())
                }
            }
        }
    }

    fn message(text: &str) -> NotificationMessage {
        NotificationMessage {
            id: 1,
            title: "Reminder".into(),
            message: text.into(),
        }
    }

    fn recipients(ids: &[&str]) -> Vec<Recipient> {
        ids.iter().map(|id| Recipient::from(*id)).collect()
    }

    #[tokio::test]
    async fn panic_in_sender_is_contained() {
        let sender = ScriptedSender::default();
        let summary = broadcast_with(&sender, &message("hi"), &recipients(&["1", "panic", "2"]), 1)
            .await
            .unwrap();
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.results[1].1,
            DeliveryResult::Aborted("sender exploded".into())
        );
        assert_eq!(*sender.calls.lock().unwrap(), vec!["1", "panic", "2"]);
    }

    #[tokio::test]
    async fn unclassified_error_does_not_stop_batch() {
        let sender = ScriptedSender::default();
        let summary = broadcast_with(&sender, &message("hi"), &recipients(&["bad", "1"]), 1)
            .await
            .unwrap();
        assert_eq!(summary.failed_recipients, recipients(&["bad"]));
        assert_eq!(
            summary.results[0].1,
            DeliveryResult::TransientFailure(FailureReason::Unclassified(
                "garbled response".into()
            ))
        );
        assert!(summary.results[1].1.is_delivered());
    }

    #[tokio::test]
    async fn concurrent_mode_reports_in_input_order() {
        let sender = ScriptedSender::default();
        let input = recipients(&["0", "1", "2", "3"]);
        let summary = broadcast_with(&sender, &message("hi"), &input, 4)
            .await
            .unwrap();
        let order: Vec<Recipient> = summary.results.iter().map(|(r, _)| r.clone()).collect();
        assert_eq!(order, input);
        assert_eq!(summary.delivered, 4);
    }

    #[tokio::test]
    async fn empty_body_is_rejected_before_sending() {
        let sender = ScriptedSender::default();
        let err = broadcast_with(&sender, &message("   "), &recipients(&["1"]), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::EmptyMessage(1)));
        assert!(sender.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_token_is_a_configuration_error() {
        let err = broadcast(&message("hi"), &recipients(&["1"]), &TelegramConfig::new(" "))
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::Configuration(ConfigError::Invalid(_))));
    }
}
