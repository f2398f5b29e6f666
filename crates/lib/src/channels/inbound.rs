//! Inbound message from a channel: delivered to the pipeline's intake controller.

/// A chat message that may carry a command. `message_id` threads the eventual reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel_id: String,
    pub conversation_id: String,
    pub message_id: i64,
    pub text: String,
}
