//! Communication channels (Telegram).
//!
//! A channel feeds [`InboundMessage`]s into the pipeline and exposes a [`ChannelHandle`]
//! the dispatchers use to deliver replies.

mod handle;
mod inbound;
mod telegram;

pub use handle::{ChannelHandle, DeliveryError};
pub use inbound::InboundMessage;
pub use telegram::{split_message, AuthError, BotUser, TelegramChannel, TelegramUpdate, MAX_MESSAGE_CHARS};
