//! Harness orchestrator: runs every scenario through an episode driver and
//! grader pair, bounded by a concurrency limit.
//!
//! Episodes are mutually independent; failures are contained at the episode
//! boundary and one fatal episode never aborts the run. Results are
//! collected in completion order and sorted by scenario id for
//! deterministic artifacts.

use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::backend::Backend;
use crate::config::RunSettings;
use crate::driver::EpisodeDriver;
use crate::errors::HarnessError;
use crate::grader::Grader;
use crate::model::{Scenario, ScoreResult};
use crate::providers::llm::ModelClient;
use crate::report::{ExcludedEpisode, RunReport};
use crate::scenario::{Dataset, FunctionCatalog};

enum EpisodeOutcome {
    Scored(ScoreResult),
    Excluded(ExcludedEpisode),
}

pub struct Harness {
    settings: RunSettings,
    model: Arc<dyn ModelClient>,
    backend: Arc<dyn Backend>,
    catalog: FunctionCatalog,
}

impl Harness {
    pub fn new(
        settings: RunSettings,
        model: Arc<dyn ModelClient>,
        backend: Arc<dyn Backend>,
        catalog: FunctionCatalog,
    ) -> Self {
        Self {
            settings,
            model,
            backend,
            catalog,
        }
    }

    /// Run the whole dataset. `shutdown` flipping to `true` cancels
    /// in-flight episodes; cancelled episodes are excluded from the report,
    /// not scored, so the metric is never skewed by incomplete runs.
    pub async fn run(
        &self,
        dataset: Dataset,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<RunReport> {
        // Reachability is a startup concern; failing mid-run on a dead
        // server would waste the whole episode budget.
        self.backend
            .probe()
            .await
            .map_err(|e| anyhow::anyhow!("startup probe failed: {e}"))?;

        let run_id = Uuid::new_v4();
        let mut excluded: Vec<ExcludedEpisode> = dataset
            .malformed
            .iter()
            .map(|e| match e {
                HarnessError::MalformedScenario { id, detail } => ExcludedEpisode {
                    scenario_id: id.clone(),
                    reason: format!("malformed scenario: {detail}"),
                },
                other => ExcludedEpisode {
                    scenario_id: "<dataset>".into(),
                    reason: other.to_string(),
                },
            })
            .collect();

        let scenarios = expand_repeats(dataset.scenarios, self.settings.repeat);
        let total = scenarios.len();
        tracing::info!(%run_id, total, parallel = self.settings.parallel, "starting run");

        let sem = Arc::new(Semaphore::new(self.settings.parallel.max(1)));
        let mut join_set = JoinSet::new();
        for scenario in scenarios {
            let sem = sem.clone();
            let shutdown = shutdown.clone();
            let score_model_failures = self.settings.score_model_failures;
            let driver = self.driver();
            let grader = Grader::new(self.backend.clone());
            join_set.spawn(async move {
                tokio::select! {
                    // biased: an already-signalled shutdown must win the race
                    // against an episode that would finish instantly.
                    biased;
                    _ = shutdown_signalled(shutdown) => EpisodeOutcome::Excluded(ExcludedEpisode {
                        scenario_id: scenario.id.clone(),
                        reason: "cancelled before completion".into(),
                    }),
                    outcome = run_one(sem, driver, grader, &scenario, score_model_failures) => outcome,
                }
            });
        }

        let mut scored = Vec::new();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(EpisodeOutcome::Scored(score)) => scored.push(score),
                Ok(EpisodeOutcome::Excluded(ex)) => excluded.push(ex),
                Err(e) => excluded.push(ExcludedEpisode {
                    scenario_id: "<unknown>".into(),
                    reason: format!("task error: {e}"),
                }),
            }
        }

        scored.sort_by(|a, b| a.scenario_id.cmp(&b.scenario_id));
        excluded.sort_by(|a, b| a.scenario_id.cmp(&b.scenario_id));

        let report = RunReport {
            run_id,
            scored,
            excluded,
        };
        tracing::info!(
            %run_id,
            mean_reward = report.mean_reward(),
            scored = report.scored.len(),
            excluded = report.excluded.len(),
            "run finished"
        );
        Ok(report)
    }

    fn driver(&self) -> EpisodeDriver {
        EpisodeDriver::new(
            self.model.clone(),
            self.backend.clone(),
            self.catalog.grammar.clone(),
            self.catalog.functions.clone(),
            self.settings.fhir_base.to_string(),
            self.settings.call_timeout(),
        )
    }
}

async fn run_one(
    sem: Arc<Semaphore>,
    driver: EpisodeDriver,
    grader: Grader,
    scenario: &Scenario,
    score_model_failures: bool,
) -> EpisodeOutcome {
    let _permit = match sem.acquire_owned().await {
        Ok(p) => p,
        Err(_) => {
            return EpisodeOutcome::Excluded(ExcludedEpisode {
                scenario_id: scenario.id.clone(),
                reason: "scheduler shut down".into(),
            })
        }
    };

    let state = driver.run(scenario).await;

    if let Some(fatal) = &state.fatal {
        if fatal.is_model_client() {
            return if score_model_failures {
                EpisodeOutcome::Scored(ScoreResult::fail(&scenario.id, fatal.to_string()))
            } else {
                EpisodeOutcome::Excluded(ExcludedEpisode {
                    scenario_id: scenario.id.clone(),
                    reason: fatal.to_string(),
                })
            };
        }
    }

    EpisodeOutcome::Scored(grader.grade(scenario, &state).await)
}

/// Repeat each scenario `repeat` times; repeated ids gain a `#k` suffix so
/// score rows stay distinguishable.
fn expand_repeats(scenarios: Vec<Scenario>, repeat: u32) -> Vec<Scenario> {
    if repeat <= 1 {
        return scenarios;
    }
    let mut out = Vec::with_capacity(scenarios.len() * repeat as usize);
    for scenario in scenarios {
        for k in 1..=repeat {
            let mut sc = scenario.clone();
            sc.id = format!("{}#{}", scenario.id, k);
            out.push(sc);
        }
    }
    out
}

/// Resolves when shutdown is requested; pends forever if the sender is gone
/// (no shutdown can arrive anymore).
async fn shutdown_signalled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
