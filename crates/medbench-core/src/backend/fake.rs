//! Scripted backend for tests: replays queued results and records every
//! request it saw.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::Backend;
use crate::errors::EpisodeError;
use crate::model::{BackendResult, RecordRequest};

pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<BackendResult, EpisodeError>>>,
    /// Result returned once the script runs out.
    default: Result<BackendResult, EpisodeError>,
    requests: Mutex<Vec<RecordRequest>>,
    probe_ok: bool,
    /// Once the script is empty, pend forever instead of answering.
    stall: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Ok(BackendResult::success(serde_json::json!({}))),
            requests: Mutex::new(Vec::new()),
            probe_ok: true,
            stall: false,
        }
    }

    /// A backend whose calls never complete, for exercising call timeouts.
    pub fn stalled() -> Self {
        let mut backend = Self::new();
        backend.stall = true;
        backend
    }

    pub fn push(self, result: Result<BackendResult, EpisodeError>) -> Self {
        self.script.lock().expect("script lock").push_back(result);
        self
    }

    pub fn with_default(mut self, default: Result<BackendResult, EpisodeError>) -> Self {
        self.default = default;
        self
    }

    pub fn unreachable_server() -> Self {
        Self::new().with_default(Err(EpisodeError::backend_unavailable("connection refused")))
    }

    pub fn requests(&self) -> Vec<RecordRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn unprobeable(mut self) -> Self {
        self.probe_ok = false;
        self
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn execute(&self, req: &RecordRequest) -> Result<BackendResult, EpisodeError> {
        self.requests.lock().expect("requests lock").push(req.clone());
        if let Some(result) = self.script.lock().expect("script lock").pop_front() {
            return result;
        }
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.default.clone()
    }

    async fn probe(&self) -> Result<(), EpisodeError> {
        if self.probe_ok {
            Ok(())
        } else {
            Err(EpisodeError::backend_unavailable("record server unreachable"))
        }
    }
}
