//! Notifier service - posts progress and errors to the configured channel
//!
//! Every method is infallible: a missing or failing channel degrades to
//! logging, and never changes the outcome of a run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ports::{MessageChannel, MessageHandle};

/// Longest message most chat channels accept
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Delay before each edit, keeps bursts of edits under chat rate limits
pub const EDIT_DELAY: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct Notifier {
    channel: Option<Arc<dyn MessageChannel>>,
    edit_delay: Duration,
}

impl Notifier {
    pub fn new(channel: Option<Arc<dyn MessageChannel>>) -> Self {
        Self {
            channel,
            edit_delay: EDIT_DELAY,
        }
    }

    /// A notifier that only logs
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_edit_delay(mut self, delay: Duration) -> Self {
        self.edit_delay = delay;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    /// Post a message, truncating it to [`MAX_MESSAGE_LENGTH`] characters
    pub async fn send(&self, message: &str) -> Option<MessageHandle> {
        info!(text = message, "notify");
        let channel = self.channel.as_ref()?;

        let length = message.chars().count();
        let text = if length > MAX_MESSAGE_LENGTH {
            let notice =
                format!("Next message is too long ({} characters), truncating", length);
            if let Err(e) = channel.post(&notice).await {
                warn!(error = %e, "Failed to send truncation notice");
            }
            message.chars().take(MAX_MESSAGE_LENGTH).collect()
        } else {
            message.to_string()
        };

        match channel.post(&text).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Failed to send message");
                None
            }
        }
    }

    /// Replace the text of a previously posted message
    pub async fn edit(&self, handle: Option<MessageHandle>, text: &str) {
        let (Some(channel), Some(handle)) = (self.channel.as_ref(), handle) else {
            debug!(text, "edit skipped, no message to edit");
            return;
        };

        tokio::time::sleep(self.edit_delay).await;
        let text: String = text.chars().take(MAX_MESSAGE_LENGTH).collect();
        if let Err(e) = channel.edit(handle, &text).await {
            if e.to_string().contains("message is not modified") {
                debug!("Ignoring unmodified message edit");
            } else {
                warn!(error = %e, "Failed to edit message");
            }
        }
    }

    /// Post an error with the name of the operation that failed
    pub async fn send_error(&self, error: &(dyn std::fmt::Display + Sync), caller: &str) {
        warn!(caller, error = %error, "Reporting error");
        let text = format!("{}\n❌ {}", caller, error);
        self.send(text.trim()).await;
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("enabled", &self.is_enabled())
            .field("edit_delay", &self.edit_delay)
            .finish()
    }
}
