//! Telegram channel: getMe at startup, long-poll getUpdates, and threaded sendMessage via Bot API.

use crate::channels::handle::{ChannelHandle, DeliveryError};
use crate::channels::inbound::InboundMessage;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Bot login failed: the token is missing, malformed, or revoked. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("telegram bot token not configured")]
    NotConfigured,
    #[error("telegram getMe request failed: {0}")]
    Request(reqwest::Error),
    #[error("telegram rejected bot token: {0}")]
    Rejected(String),
}

/// Bot API envelope: `{"ok": true, "result": ...}` or `{"ok": false, "description": "..."}`.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// The bot's own account (getMe result).
#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

impl TelegramUpdate {
    /// The update as a pipeline message; None for non-message updates and messages without text.
    pub fn into_inbound(self, channel_id: &str) -> Option<InboundMessage> {
        let msg = self.message?;
        let text = msg.text.filter(|t| !t.trim().is_empty())?;
        Some(InboundMessage {
            channel_id: channel_id.to_string(),
            conversation_id: msg.chat.id.to_string(),
            message_id: msg.message_id,
            text,
        })
    }
}

/// Telegram channel connector: long-polls for updates and sends replies via sendMessage.
pub struct TelegramChannel {
    id: String,
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(token, telegram_api_base())
    }

    /// Channel against a custom Bot API root (local server or test double).
    pub fn with_api_base(token: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            id: "telegram".to_string(),
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> Option<String> {
        let token = self.token.as_ref()?;
        Some(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// Call getMe to check the token. Returns the bot account on success.
    pub async fn get_me(&self) -> Result<BotUser, AuthError> {
        let url = self.method_url("getMe").ok_or(AuthError::NotConfigured)?;
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.without_url()))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| AuthError::Request(e.without_url()))?;
        match parse_envelope::<BotUser>(&body) {
            Ok(user) => Ok(user),
            Err(desc) => Err(AuthError::Rejected(format!("{} {}", status, desc))),
        }
    }

    /// Start the getUpdates long-poll loop and forward messages to the pipeline. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let url = self
            .method_url("getUpdates")
            .ok_or("telegram bot token not configured")?;
        let mut url = format!("{}?timeout={}", url, LONG_POLL_TIMEOUT);
        if let Some(off) = offset {
            url = format!("{}&offset={}", url, off);
        }
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| e.without_url().to_string())?;
        let updates: Vec<TelegramUpdate> = parse_envelope(&body)
            .map_err(|desc| format!("getUpdates failed: {} {}", status, desc))?;
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Send one sendMessage request (text must already fit Telegram's limit).
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), DeliveryError> {
        let url = self
            .method_url("sendMessage")
            .ok_or(DeliveryError::NotConfigured("telegram bot token"))?;
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(id) = reply_to {
            body["reply_to_message_id"] = serde_json::Value::from(id);
            body["allow_sending_without_reply"] = serde_json::Value::Bool(true);
        }
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Request(e.without_url()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DeliveryError::Api(format!(
                "sendMessage failed: {} {}",
                status, body
            )));
        }
        Ok(())
    }
}

/// Decode a Bot API envelope; Err carries the API description on `ok: false` or a parse error.
fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    let data: ApiResponse<T> = serde_json::from_str(body).map_err(|e| e.to_string())?;
    if !data.ok {
        return Err(data
            .description
            .unwrap_or_else(|| "ok: false".to_string()));
    }
    data.result.ok_or_else(|| "missing result".to_string())
}

async fn run_get_updates_loop(
    channel: Arc<TelegramChannel>,
    inbound_tx: mpsc::Sender<InboundMessage>,
) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        let polled = tokio::select! {
            _ = inbound_tx.closed() => break,
            polled = channel.get_updates(offset) => polled,
        };
        match polled {
            Ok((updates, next)) => {
                offset = next.or(offset);
                for u in updates {
                    let update_id = u.update_id;
                    let Some(inbound) = u.into_inbound(&channel.id) else {
                        log::debug!("telegram: skipping update {} without text", update_id);
                        continue;
                    };
                    if inbound_tx.send(inbound).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Long texts go out as several messages, each threaded to `reply_to`.
    async fn send_reply(
        &self,
        conversation_id: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), DeliveryError> {
        for part in split_message(text, MAX_MESSAGE_CHARS) {
            self.send_message(conversation_id, &part, reply_to).await?;
        }
        Ok(())
    }
}

/// Split `text` into pieces of at most `max_chars` characters, cutting after the last newline
/// in each window when there is one.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if end == rest.len() {
            parts.push(rest.to_string());
            return parts;
        }
        let cut = match rest[..end].rfind('\n') {
            Some(i) if i > 0 => i + 1,
            _ => end,
        };
        parts.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
}

/// Resolve Telegram bot API base URL (for tests or custom endpoints).
fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE")
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}
