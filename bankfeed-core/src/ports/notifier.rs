//! Progress/notification surface port

use async_trait::async_trait;

use crate::domain::result::Result;

/// Handle to a posted message that can later be edited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub i64);

/// A chat-like channel that can post and edit text messages
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Post a message, returning a handle when the channel supports edits
    async fn post(&self, text: &str) -> Result<Option<MessageHandle>>;

    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()>;
}
