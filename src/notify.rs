//! Plain-text events for the chat front-end. Delivery belongs to the
//! collaborator; a failed send is logged and dropped.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LongOpened(String),
    ShortOpened(String),
    CloseLong(String),
    CloseShort(String),
    OpenFailed,
    CloseFailed(String),
    StopLossFailed(String),
    Scanning(Vec<String>),
    StartingAgain(String),
    Stopping,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::LongOpened(s) => write!(f, "Long Opened {}", s),
            Notice::ShortOpened(s) => write!(f, "Short Opened {}", s),
            Notice::CloseLong(s) => write!(f, "Close Long {} due reverse Signal", s),
            Notice::CloseShort(s) => write!(f, "Close Short {} due reverse Signal", s),
            Notice::OpenFailed => f.write_str("Could not open new position"),
            Notice::CloseFailed(s) => write!(f, "Could not close a position {}", s),
            Notice::StopLossFailed(s) => write!(f, "Could not modify stop loss {}", s),
            Notice::Scanning(symbols) => write!(f, "Looking for pattern in {}", symbols.join(", ")),
            Notice::StartingAgain(at) => write!(f, "Starting again at {}", at),
            Notice::Stopping => f.write_str("Stopping"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError>;
}

/// Writes every notice to the structured log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        log(Level::Info, Domain::Notify, "notice", obj(&[("msg", v_str(&notice.to_string()))]));
        Ok(())
    }
}

/// Posts notices to a chat through the bot HTTP API.
pub struct ChatNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl ChatNotifier {
    pub fn new(token: &str, chat_id: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("https://api.telegram.org/bot{}/sendMessage", token),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "chat_id": self.chat_id, "text": notice.to_string() }))
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotifyError(format!("http {}", resp.status().as_u16())));
        }
        Ok(())
    }
}

/// Sends each notice to every inner notifier; the first failure is reported
/// after all of them were tried.
pub struct FanOut(pub Vec<Box<dyn Notifier>>);

#[async_trait]
impl Notifier for FanOut {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        let mut first_err = None;
        for n in &self.0 {
            if let Err(e) = n.send(notice).await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
