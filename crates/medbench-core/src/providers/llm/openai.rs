//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use serde_json::json;

use super::{ChatMessage, ModelClient};

const DEFAULT_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiClient {
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    chat_url: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(model: String, api_key: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            api_key,
            temperature,
            max_tokens,
            chat_url: DEFAULT_CHAT_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a compatible endpoint (proxy, local server).
    pub fn with_chat_url(mut self, url: impl Into<String>) -> Self {
        self.chat_url = url.into();
        self
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn next_turn(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let resp = self
            .client
            .post(&self.chat_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat API error (status {status}): {error_text}");
        }

        let json: serde_json::Value = resp.json().await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("chat API response missing content"))?
            .to_string();
        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
