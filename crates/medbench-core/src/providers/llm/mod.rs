//! Model-client seam: the episode driver asks for "the next agent turn
//! given the conversation so far" and receives free-form text. Everything
//! past this trait belongs to the sampling layer.

pub mod fake;
pub mod openai;

use async_trait::async_trait;
use serde::Serialize;

/// One chat message in provider wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Produce the agent's next free-text turn given the transcript so far.
    async fn next_turn(&self, messages: &[ChatMessage]) -> anyhow::Result<String>;

    fn provider_name(&self) -> &'static str;
}
