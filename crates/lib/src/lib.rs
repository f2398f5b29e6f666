//! Quill core library: configuration, the Telegram channel, the Gemini client, and the
//! bounded worker/dispatcher pipeline that connects them.

pub mod channels;
pub mod config;
pub mod init;
pub mod llm;
pub mod pipeline;
