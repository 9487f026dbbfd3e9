//! Scripted model client for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{ChatMessage, ModelClient};

pub struct FakeModelClient {
    turns: Mutex<VecDeque<String>>,
    /// Returned forever once the script is empty.
    fallback: Option<String>,
    /// Once the script is empty, pend forever instead of answering.
    stall: bool,
}

impl FakeModelClient {
    pub fn scripted<I, S>(turns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            turns: Mutex::new(turns.into_iter().map(Into::into).collect()),
            fallback: None,
            stall: false,
        }
    }

    /// A client that answers the same turn forever; handy for concurrent
    /// harness tests where per-episode ordering is not deterministic.
    pub fn repeating(turn: impl Into<String>) -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            fallback: Some(turn.into()),
            stall: false,
        }
    }

    /// A client that always fails, for exercising model-failure paths.
    pub fn failing() -> Self {
        Self::scripted(Vec::<String>::new())
    }

    /// A client whose next call never completes, for exercising call
    /// timeouts.
    pub fn stalled() -> Self {
        let mut client = Self::failing();
        client.stall = true;
        client
    }
}

#[async_trait]
impl ModelClient for FakeModelClient {
    async fn next_turn(&self, _messages: &[ChatMessage]) -> anyhow::Result<String> {
        if let Some(turn) = self.turns.lock().expect("turns lock").pop_front() {
            return Ok(turn);
        }
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.fallback
            .clone()
            .ok_or_else(|| anyhow::anyhow!("scripted model client exhausted"))
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
