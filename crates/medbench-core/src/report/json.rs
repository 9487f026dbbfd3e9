use crate::report::RunReport;
use std::path::Path;

pub fn write_json(report: &RunReport, out: &Path) -> anyhow::Result<()> {
    let v = serde_json::json!({
        "run_id": report.run_id,
        "mean_reward": report.mean_reward(),
        "scored": report.scored,
        "excluded": report.excluded,
    });
    std::fs::write(out, serde_json::to_string_pretty(&v)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoreResult;
    use crate::report::ExcludedEpisode;
    use uuid::Uuid;

    #[test]
    fn artifact_round_trips_through_json() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            scored: vec![ScoreResult::pass("task1_0", "matched")],
            excluded: vec![ExcludedEpisode {
                scenario_id: "task1_1".into(),
                reason: "cancelled".into(),
            }],
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        write_json(&report, &path).expect("write");

        let text = std::fs::read_to_string(&path).expect("read");
        let v: serde_json::Value = serde_json::from_str(&text).expect("parse");
        assert_eq!(v["mean_reward"], serde_json::json!(1.0));
        assert_eq!(v["scored"][0]["scenario_id"], "task1_0");
        assert_eq!(v["excluded"][0]["reason"], "cancelled");
    }
}
