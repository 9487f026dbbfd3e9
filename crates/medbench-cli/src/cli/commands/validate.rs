use medbench_core::config::DEFAULT_TURN_LIMIT;
use medbench_core::scenario::load_dataset;

use crate::cli::args::ValidateArgs;
use crate::exit_codes;

pub fn execute(args: &ValidateArgs) -> anyhow::Result<i32> {
    let dataset = load_dataset(&args.data, DEFAULT_TURN_LIMIT, None, None)?;
    println!(
        "{}: {} scenario(s), {} malformed",
        args.data.display(),
        dataset.scenarios.len(),
        dataset.malformed.len()
    );
    for err in &dataset.malformed {
        println!("  - {err}");
    }
    if dataset.malformed.is_empty() {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::CONFIG_ERROR)
    }
}
