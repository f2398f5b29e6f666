//! Units of work moving through the queues. Each unit is owned by one stage at a time.

use std::fmt;

/// One pending generation job. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestUnit {
    origin_message_id: i64,
    conversation_id: String,
    prompt_text: String,
    credential: String,
}

impl RequestUnit {
    pub fn new(
        origin_message_id: i64,
        conversation_id: impl Into<String>,
        prompt_text: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            origin_message_id,
            conversation_id: conversation_id.into(),
            prompt_text: prompt_text.into(),
            credential: credential.into(),
        }
    }

    pub fn origin_message_id(&self) -> i64 {
        self.origin_message_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for RequestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestUnit")
            .field("origin_message_id", &self.origin_message_id)
            .field("conversation_id", &self.conversation_id)
            .field("prompt_text", &self.prompt_text)
            .finish_non_exhaustive()
    }
}

/// How a response came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// Text produced by the generation backend.
    Generated,
    /// Apology sent because generation failed for the request.
    Failed,
    /// Notice produced by intake without a backend call (e.g. missing argument).
    Notice,
}

/// One completed unit of work, addressed back to the message that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseUnit {
    origin_message_id: i64,
    conversation_id: String,
    response_text: String,
    kind: ResponseKind,
}

impl ResponseUnit {
    /// Response for `request`, copying its origin and conversation.
    pub fn for_request(request: &RequestUnit, response_text: String, kind: ResponseKind) -> Self {
        Self {
            origin_message_id: request.origin_message_id,
            conversation_id: request.conversation_id.clone(),
            response_text,
            kind,
        }
    }

    pub fn notice(
        origin_message_id: i64,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            origin_message_id,
            conversation_id: conversation_id.into(),
            response_text: text.into(),
            kind: ResponseKind::Notice,
        }
    }

    pub fn origin_message_id(&self) -> i64 {
        self.origin_message_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn response_text(&self) -> &str {
        &self.response_text
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }
}
