//! Telegram Bot API message channel

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::TelegramSettings;
use crate::domain::result::{Error, Result};
use crate::ports::{MessageChannel, MessageHandle};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramChannel {
    client: Client,
    base_url: String,
    api_key: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(settings: &TelegramSettings) -> Result<Self> {
        Self::new_with_base_url(settings, DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(settings: &TelegramSettings, base_url: &str) -> Result<Self> {
        let (Some(api_key), Some(chat_id)) = (
            settings.api_key.as_deref().filter(|k| !k.is_empty()),
            settings.chat_id.as_deref().filter(|c| !c.is_empty()),
        ) else {
            return Err(Error::Config(
                "Telegram needs both an API key and a chat id".to_string(),
            ));
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>> {
        let url = format!("{}/bot{}/{}", self.base_url, self.api_key, method);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Notifier(format!("Telegram {} failed: {}", method, e.without_url())))?;

        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Notifier(format!("Invalid Telegram response: {}", e.without_url())))?;

        if !parsed.ok {
            return Err(Error::Notifier(
                parsed
                    .description
                    .unwrap_or_else(|| format!("Telegram {} failed", method)),
            ));
        }
        Ok(parsed.result)
    }
}

#[async_trait]
impl MessageChannel for TelegramChannel {
    async fn post(&self, text: &str) -> Result<Option<MessageHandle>> {
        let body = serde_json::to_value(SendMessage {
            chat_id: &self.chat_id,
            text,
        })?;
        let sent: Option<SentMessage> = self.call("sendMessage", &body).await?;
        Ok(sent.map(|m| MessageHandle(m.message_id)))
    }

    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": self.chat_id,
            "message_id": handle.0,
            "text": text,
        });
        self.call::<serde_json::Value>("editMessageText", &body).await?;
        Ok(())
    }
}

/// Channel that writes every message to the log
///
/// Used when no chat is configured, so progress stays visible.
#[derive(Debug, Default)]
pub struct LogChannel {
    next: std::sync::atomic::AtomicI64,
}

impl LogChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageChannel for LogChannel {
    async fn post(&self, text: &str) -> Result<Option<MessageHandle>> {
        let id = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        debug!(message_id = id, text, "post");
        Ok(Some(MessageHandle(id)))
    }

    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()> {
        debug!(message_id = handle.0, text, "edit");
        Ok(())
    }
}
