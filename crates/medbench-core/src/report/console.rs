//! Console summary, printed to stderr.

use crate::report::RunReport;

pub fn print_summary(report: &RunReport) {
    eprintln!();
    for r in &report.scored {
        if r.reward == 1.0 {
            eprintln!("✅ {:<20} 1.0", r.scenario_id);
        } else {
            eprintln!("❌ {:<20} 0.0  {}", r.scenario_id, r.reason);
        }
    }
    for e in &report.excluded {
        eprintln!("⏭️  {:<20} EXCLUDED ({})", e.scenario_id, e.reason);
    }

    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!(
        "Summary: {} passed, {} failed, {} excluded",
        report.passed(),
        report.failed(),
        report.excluded.len()
    );
    eprintln!(
        "Mean reward: {:.4} over {} scored episode(s)",
        report.mean_reward(),
        report.scored.len()
    );
}
