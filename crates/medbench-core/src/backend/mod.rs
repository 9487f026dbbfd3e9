//! Backend adapter: executes record requests against the external FHIR
//! server and normalizes responses.
//!
//! This is the only component allowed to mutate server state. Exactly one
//! network call happens per action; 4xx responses are agent errors and are
//! never retried, while transport-level failures and 5xx responses retry on
//! a bounded backoff schedule before escalating to `BackendUnavailable`.

pub mod fake;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

use crate::errors::{EpisodeError, HarnessError};
use crate::model::{BackendResult, RecordRequest};

/// Seam between the episode driver / grader and the record server. The
/// grader issues read-only requests through the same trait.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn execute(&self, req: &RecordRequest) -> Result<BackendResult, EpisodeError>;

    /// Startup reachability probe; a failing probe aborts the run before any
    /// episode starts.
    async fn probe(&self) -> Result<(), EpisodeError>;
}

/// Bounded retry schedule for infrastructure failures: `attempts` tries with
/// doubling delay, starting at `base_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

enum SendOutcome {
    Done(BackendResult),
    Retry(String),
}

pub struct FhirBackend {
    base: Url,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl FhirBackend {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, HarnessError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base,
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Agents address resources either absolutely (the prompt hands them the
    /// api base) or relative to the base.
    fn resolve(&self, url: &str) -> Result<Url, String> {
        let resolved = if url.starts_with("http://") || url.starts_with("https://") {
            Url::parse(url)
        } else {
            self.base.join(url)
        };
        resolved.map_err(|e| format!("invalid request URL {url:?}: {e}"))
    }

    async fn send_once(&self, req: &RecordRequest) -> SendOutcome {
        let url = match self.resolve(req.url()) {
            Ok(u) => u,
            // A URL the agent mangled is the agent's mistake, not an outage.
            Err(detail) => return SendOutcome::Done(BackendResult::rejected(detail)),
        };
        let request = match req {
            RecordRequest::Read { .. } => {
                let mut url = url;
                url.query_pairs_mut().append_pair("_format", "json");
                self.client.get(url)
            }
            RecordRequest::Create { payload, .. } => self.client.post(url).json(payload),
            RecordRequest::Update { payload, .. } => self.client.put(url).json(payload),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return SendOutcome::Retry(e.to_string()),
        };
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            let payload = serde_json::from_str(&body)
                .unwrap_or_else(|_| serde_json::Value::String(body));
            SendOutcome::Done(BackendResult::success(payload))
        } else if status.is_client_error() {
            SendOutcome::Done(BackendResult::rejected(rejection_detail(status, &body)))
        } else {
            SendOutcome::Retry(format!("server returned {status}"))
        }
    }
}

fn rejection_detail(status: StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        format!("request rejected with status {status}")
    } else {
        format!("request rejected with status {status}: {body}")
    }
}

#[async_trait]
impl Backend for FhirBackend {
    async fn execute(&self, req: &RecordRequest) -> Result<BackendResult, EpisodeError> {
        let mut last_detail = String::new();
        for attempt in 0..self.retry.attempts {
            match self.send_once(req).await {
                SendOutcome::Done(result) => return Ok(result),
                SendOutcome::Retry(detail) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.retry.attempts,
                        url = req.url(),
                        %detail,
                        "backend call failed, retrying"
                    );
                    last_detail = detail;
                    if attempt + 1 < self.retry.attempts {
                        tokio::time::sleep(self.retry.delay(attempt)).await;
                    }
                }
            }
        }
        Err(EpisodeError::backend_unavailable(last_detail))
    }

    async fn probe(&self) -> Result<(), EpisodeError> {
        // Any HTTP answer proves reachability; only transport failures count.
        let url = self
            .base
            .join("metadata")
            .map_err(|e| EpisodeError::backend_unavailable(e.to_string()))?;
        let mut last_detail = String::new();
        for attempt in 0..self.retry.attempts {
            match self.client.get(url.clone()).send().await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    last_detail = e.to_string();
                    if attempt + 1 < self.retry.attempts {
                        tokio::time::sleep(self.retry.delay(attempt)).await;
                    }
                }
            }
        }
        Err(EpisodeError::backend_unavailable(format!(
            "record server unreachable: {last_detail}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> FhirBackend {
        let base = Url::parse("http://localhost:8080/fhir/").expect("url");
        FhirBackend::new(base, Duration::from_secs(5)).expect("backend")
    }

    #[test]
    fn relative_urls_join_the_base() {
        let b = backend();
        let url = b.resolve("Patient?identifier=S123").expect("resolve");
        assert_eq!(url.as_str(), "http://localhost:8080/fhir/Patient?identifier=S123");
    }

    #[test]
    fn absolute_urls_pass_through() {
        let b = backend();
        let url = b.resolve("http://other:9000/fhir/Patient").expect("resolve");
        assert_eq!(url.host_str(), Some("other"));
    }

    #[test]
    fn mangled_urls_are_rejections_not_outages() {
        let b = backend();
        assert!(b.resolve("http://[broken").is_err());
    }

    #[test]
    fn retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
    }

    #[test]
    fn rejection_detail_includes_body_when_present() {
        let detail = rejection_detail(StatusCode::CONFLICT, "version mismatch");
        assert!(detail.contains("409"));
        assert!(detail.contains("version mismatch"));
        let bare = rejection_detail(StatusCode::BAD_REQUEST, "  ");
        assert!(bare.ends_with("400 Bad Request"));
    }
}
