use {async_trait::async_trait, std::sync::Arc};

use crate::Result;

/// Send messages to a conversation.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<()>;

    /// Send a "typing" indicator. No-op by default.
    async fn send_typing(&self, _conversation_id: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: ChannelOutbound + ?Sized> ChannelOutbound for Arc<T> {
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<()> {
        (**self).send_text(conversation_id, text).await
    }

    async fn send_typing(&self, conversation_id: &str) -> Result<()> {
        (**self).send_typing(conversation_id).await
    }
}
