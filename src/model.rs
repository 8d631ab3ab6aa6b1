use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Messaging identifier of a client (their Telegram `chat_id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(String);

impl Recipient {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Recipient {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationMessage {
    pub id: i64,
    /// Shown to operators only; never delivered.
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub tg_id: String,
    pub first_name: Option<String>,
    pub job_title: Option<String>,
    pub is_speaker: bool,
    pub event_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Why a single delivery did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// The Bot API answered with a 4xx/5xx status.
    RemoteRejection {
        status: u16,
        description: Option<String>,
    },
    /// The request never got a response (connect error, timeout, ...).
    Transport(String),
    Unclassified(String),
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::RemoteRejection { .. } => "remote_rejection",
            FailureReason::Transport(_) => "transport",
            FailureReason::Unclassified(_) => "unclassified",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RemoteRejection {
                status,
                description: Some(desc),
            } => write!(f, "rejected with status {status}: {desc}"),
            FailureReason::RemoteRejection { status, .. } => {
                write!(f, "rejected with status {status}")
            }
            FailureReason::Transport(msg) => write!(f, "transport error: {msg}"),
            FailureReason::Unclassified(msg) => write!(f, "unexpected error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeliveryResult {
    Delivered,
    TransientFailure(FailureReason),
    /// The attempt blew up inside the sender (panic) and was cut short.
    Aborted(String),
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered)
    }
}

/// Outcome of one broadcast, in recipient input order.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastSummary {
    pub broadcast_id: Uuid,
    pub delivered: usize,
    pub failed: usize,
    pub failed_recipients: Vec<Recipient>,
    pub results: Vec<(Recipient, DeliveryResult)>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BroadcastSummary {
    pub fn from_results(
        broadcast_id: Uuid,
        started_at: DateTime<Utc>,
        results: Vec<(Recipient, DeliveryResult)>,
    ) -> Self {
        let failed_recipients: Vec<Recipient> = results
            .iter()
            .filter(|(_, r)| !r.is_delivered())
            .map(|(rcpt, _)| rcpt.clone())
            .collect();
        Self {
            broadcast_id,
            delivered: results.len() - failed_recipients.len(),
            failed: failed_recipients.len(),
            failed_recipients,
            results,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn all_delivered(&self) -> bool {
        self.failed == 0
    }
}
