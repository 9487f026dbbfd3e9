pub mod console;
pub mod json;

use crate::model::ScoreResult;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Episodes excluded from the aggregate (infrastructure errors,
/// cancellation, malformed scenarios). Kept apart from scored 0.0 results:
/// the two carry different diagnostic meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedEpisode {
    pub scenario_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub scored: Vec<ScoreResult>,
    pub excluded: Vec<ExcludedEpisode>,
}

impl RunReport {
    /// Headline metric: arithmetic mean of reward over scored episodes.
    pub fn mean_reward(&self) -> f64 {
        if self.scored.is_empty() {
            return 0.0;
        }
        self.scored.iter().map(|s| s.reward).sum::<f64>() / self.scored.len() as f64
    }

    pub fn passed(&self) -> usize {
        self.scored.iter().filter(|s| s.reward == 1.0).count()
    }

    pub fn failed(&self) -> usize {
        self.scored.len() - self.passed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_reward_over_scored_only() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            scored: vec![
                ScoreResult::pass("a", "ok"),
                ScoreResult::fail("b", "wrong"),
                ScoreResult::pass("c", "ok"),
            ],
            excluded: vec![ExcludedEpisode {
                scenario_id: "d".into(),
                reason: "model client failure".into(),
            }],
        };
        assert!((report.mean_reward() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn empty_run_has_zero_mean() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            scored: vec![],
            excluded: vec![],
        };
        assert_eq!(report.mean_reward(), 0.0);
    }
}
