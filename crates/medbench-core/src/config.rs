//! Run configuration: one required parameter (the record-server base
//! address, validated fail-fast) plus optional run controls. Values merge
//! with precedence CLI > config file > defaults.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::errors::HarnessError;

pub const DEFAULT_PARALLEL: usize = 4;
pub const DEFAULT_TURN_LIMIT: u32 = 8;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Record-server base address. Must be http(s) and end with `/`.
    pub fhir_base: Url,
    /// Concurrent episode bound.
    pub parallel: usize,
    /// Default turn budget per scenario (scenario-level override wins).
    pub turn_limit: u32,
    /// Truncate the dataset to the first N scenarios.
    pub samples: Option<usize>,
    /// Run each scenario this many times.
    pub repeat: u32,
    /// Sampling temperature passed through to the model client.
    pub temperature: f32,
    /// Timeout for each awaited model/backend call.
    pub timeout_seconds: u64,
    /// Score model-client failures 0.0 instead of excluding them.
    pub score_model_failures: bool,
    /// Restrict the run to these task families (prefix before `_`).
    pub tasks: Option<Vec<String>>,
}

impl RunSettings {
    pub fn new(fhir_base: Url) -> Self {
        Self {
            fhir_base,
            parallel: DEFAULT_PARALLEL,
            turn_limit: DEFAULT_TURN_LIMIT,
            samples: None,
            repeat: 1,
            temperature: 0.0,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            score_model_failures: false,
            tasks: None,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    /// Overlay file-provided values onto defaults. CLI overrides are applied
    /// by the caller afterwards.
    pub fn apply_file(&mut self, file: &RunConfigFile) {
        if let Some(parallel) = file.parallel {
            self.parallel = parallel.max(1);
        }
        if let Some(turn_limit) = file.turn_limit {
            self.turn_limit = turn_limit;
        }
        if let Some(samples) = file.samples {
            self.samples = Some(samples);
        }
        if let Some(repeat) = file.repeat {
            self.repeat = repeat.max(1);
        }
        if let Some(temperature) = file.temperature {
            self.temperature = temperature;
        }
        if let Some(timeout) = file.timeout_seconds {
            self.timeout_seconds = timeout;
        }
        if let Some(score) = file.score_model_failures {
            self.score_model_failures = score;
        }
        if let Some(tasks) = &file.tasks {
            self.tasks = Some(tasks.clone());
        }
    }
}

/// Optional YAML run-config file. Every field optional; the base address may
/// come from here or from the CLI, whichever the caller resolves first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfigFile {
    pub fhir_base: Option<String>,
    pub parallel: Option<usize>,
    pub turn_limit: Option<u32>,
    pub samples: Option<usize>,
    pub repeat: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
    pub score_model_failures: Option<bool>,
    pub tasks: Option<Vec<String>>,
}

impl RunConfigFile {
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&text).map_err(|e| {
            HarnessError::Config(format!("failed to parse config {}: {}", path.display(), e))
        })
    }
}

/// Fail-fast validation of the record-server base address. Malformed bases
/// must be caught at startup, never mid-episode.
pub fn parse_fhir_base(raw: &str) -> Result<Url, HarnessError> {
    let url = Url::parse(raw)
        .map_err(|e| HarnessError::Config(format!("invalid FHIR base URL {raw:?}: {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(HarnessError::Config(format!(
            "invalid FHIR base URL {raw:?}: scheme must be http or https"
        )));
    }
    if !url.path().ends_with('/') {
        return Err(HarnessError::Config(format!(
            "invalid FHIR base URL {raw:?}: must end with a trailing '/'"
        )));
    }
    Ok(url)
}
