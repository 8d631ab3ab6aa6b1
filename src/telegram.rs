use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, TelegramConfig};
use crate::model::{FailureReason, Recipient};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("bot api rejected the message with status {status}")]
    Rejected {
        status: u16,
        description: Option<String>,
    },
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected error: {0}")]
    Unclassified(String),
}

impl SendError {
    /// Connection-level problems are transport errors, everything else
    /// reqwest reports (bad body, redirect loop, builder) is unclassified.
    /// The request URL is stripped: it carries the bot token and the text.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_connect() || err.is_timeout() || err.is_request() {
            SendError::Transport(err)
        } else {
            SendError::Unclassified(err.to_string())
        }
    }
}

impl From<SendError> for FailureReason {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Rejected {
                status,
                description,
            } => FailureReason::RemoteRejection {
                status,
                description,
            },
            SendError::Transport(e) => FailureReason::Transport(e.to_string()),
            SendError::Unclassified(msg) => FailureReason::Unclassified(msg),
        }
    }
}

/// Delivers one text message to one recipient.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, recipient: &Recipient, text: &str) -> Result<(), SendError>;
}

/// Minimal Bot API client: just `sendMessage`.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(cfg: &TelegramConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let http = Client::builder()
            .user_agent("meetup-notifier/0.1")
            .timeout(cfg.timeout())
            .no_proxy()
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            base_url: cfg.base_url()?,
            token: cfg.bot_token.trim().to_string(),
        })
    }

    /// `GET {base}/bot<token>/sendMessage?chat_id=..&text=..`, query values
    /// encoded by the URL builder.
    pub fn build_send_message_request(
        &self,
        recipient: &Recipient,
        text: &str,
    ) -> Result<reqwest::Request, SendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SendError::Unclassified("api base URL cannot carry a path".into()))?
            .pop_if_empty()
            .push(&format!("bot{}", self.token))
            .push("sendMessage");
        url.query_pairs_mut()
            .append_pair("chat_id", recipient.as_str())
            .append_pair("text", text);
        self.http
            .get(url)
            .build()
            .map_err(|e| {
                SendError::Unclassified(format!("failed to build request: {}", e.without_url()))
            })
    }
}

#[async_trait]
impl MessageSender for TelegramClient {
    async fn send_message(&self, recipient: &Recipient, text: &str) -> Result<(), SendError> {
        let request = self.build_send_message_request(recipient, text)?;
        let res = self
            .http
            .execute(request)
            .await
            .map_err(SendError::from_reqwest)?;

        let status = res.status();
        if status.is_client_error() || status.is_server_error() {
            let body = res.text().await.unwrap_or_default();
            let description = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.description);
            return Err(SendError::Rejected {
                status: status.as_u16(),
                description,
            });
        }
        debug!(recipient = %recipient, status = %status, "message accepted");
        Ok(())
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    description: Option<String>,
}
