//! Channel handle: the delivery side of a chat channel, shared by all dispatchers.

use async_trait::async_trait;

/// Failure to deliver one reply. Logged by the dispatcher; never retried.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("channel request failed: {0}")]
    Request(reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),
}

/// Handle to a running channel (stop, send reply). Must be safe for concurrent sends.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Stop the channel's inbound connector. Sending stays available.
    fn stop(&self);
    /// Send `text` to a conversation, threaded to `reply_to` when given.
    async fn send_reply(
        &self,
        conversation_id: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), DeliveryError>;
}
