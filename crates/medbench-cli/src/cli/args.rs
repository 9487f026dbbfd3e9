use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "medbench",
    version,
    about = "Multi-turn clinical-agent evaluation harness against a FHIR record server"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the scenario suite and print the aggregate report
    Run(RunArgs),
    /// Check a dataset file for malformed scenarios without running anything
    Validate(ValidateArgs),
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// FHIR record-server base URL (must end with '/')
    #[arg(long, env = "MEDBENCH_FHIR_BASE")]
    pub fhir_base: Option<String>,

    /// Scenario dataset (JSON array of cases)
    #[arg(long)]
    pub data: PathBuf,

    /// Function catalog shown to the agent
    #[arg(long)]
    pub functions: PathBuf,

    /// Optional YAML run config; CLI flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Model identifier for the chat-completions client
    #[arg(long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// API key for the model provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Chat-completions endpoint override (proxy, local server)
    #[arg(long)]
    pub chat_url: Option<String>,

    /// Concurrent episode bound
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Turn budget override for every scenario
    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Truncate the dataset to the first N scenarios
    #[arg(long)]
    pub samples: Option<usize>,

    /// Run each scenario K times
    #[arg(long)]
    pub repeat: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Timeout per awaited model/backend call, in seconds
    #[arg(long)]
    pub timeout_seconds: Option<u64>,

    /// Restrict to these task families (e.g. task1 task4)
    #[arg(long, num_args = 1..)]
    pub tasks: Option<Vec<String>>,

    /// Score model-client failures 0.0 instead of excluding them
    #[arg(long)]
    pub score_model_failures: bool,

    /// Write the report as JSON to this path
    #[arg(long)]
    pub json_out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Scenario dataset (JSON array of cases)
    #[arg(long)]
    pub data: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_parse_with_required_flags() {
        let cli = Cli::try_parse_from([
            "medbench",
            "run",
            "--fhir-base",
            "http://localhost:8080/fhir/",
            "--data",
            "cases.json",
            "--functions",
            "funcs.json",
            "--api-key",
            "k",
            "--tasks",
            "task1",
            "task4",
        ])
        .expect("parse");
        match cli.cmd {
            Command::Run(args) => {
                assert_eq!(args.fhir_base.as_deref(), Some("http://localhost:8080/fhir/"));
                assert_eq!(args.tasks, Some(vec!["task1".into(), "task4".into()]));
                assert!(!args.score_model_failures);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn validate_needs_only_data() {
        let cli = Cli::try_parse_from(["medbench", "validate", "--data", "cases.json"])
            .expect("parse");
        assert!(matches!(cli.cmd, Command::Validate(_)));
    }
}
