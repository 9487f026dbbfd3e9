use std::sync::Arc;
use tokio::sync::watch;

use medbench_core::backend::FhirBackend;
use medbench_core::config::{parse_fhir_base, RunConfigFile, RunSettings};
use medbench_core::engine::Harness;
use medbench_core::providers::llm::openai::OpenAiClient;
use medbench_core::report::{console, json};
use medbench_core::scenario::{load_dataset, FunctionCatalog};

use crate::cli::args::RunArgs;
use crate::exit_codes;

pub async fn execute(args: RunArgs) -> anyhow::Result<i32> {
    let file = match &args.config {
        Some(path) => RunConfigFile::load(path)?,
        None => RunConfigFile::default(),
    };

    // Base address: CLI flag wins over the config file. Required either way,
    // and validated before anything touches the network.
    let base_raw = args
        .fhir_base
        .clone()
        .or_else(|| file.fhir_base.clone())
        .ok_or_else(|| anyhow::anyhow!("config error: --fhir-base is required"))?;
    let mut settings = RunSettings::new(parse_fhir_base(&base_raw)?);
    settings.apply_file(&file);
    apply_cli_overrides(&mut settings, &args);

    let catalog = FunctionCatalog::load(&args.functions)?;
    let dataset = match load_dataset(
        &args.data,
        settings.turn_limit,
        settings.tasks.as_deref(),
        settings.samples,
    ) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("run aborted: {e}");
            return Ok(exit_codes::RUN_ABORTED);
        }
    };
    if dataset.scenarios.is_empty() && dataset.malformed.is_empty() {
        tracing::error!(
            "run aborted: dataset {} selected no scenarios",
            args.data.display()
        );
        return Ok(exit_codes::RUN_ABORTED);
    }

    let backend = Arc::new(FhirBackend::new(
        settings.fhir_base.clone(),
        settings.call_timeout(),
    )?);
    let mut model = OpenAiClient::new(
        args.model.clone(),
        args.api_key.clone(),
        settings.temperature,
        1024,
    );
    if let Some(url) = &args.chat_url {
        model = model.with_chat_url(url);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested, cancelling in-flight episodes");
            let _ = shutdown_tx.send(true);
        }
    });

    let cancelled = shutdown_rx.clone();
    let harness = Harness::new(settings, Arc::new(model), backend, catalog);
    let report = match harness.run(dataset, shutdown_rx).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("run aborted: {e}");
            return Ok(exit_codes::RUN_ABORTED);
        }
    };

    console::print_summary(&report);
    if let Some(path) = &args.json_out {
        json::write_json(&report, path)?;
        tracing::info!("report written to {}", path.display());
    }

    if *cancelled.borrow() {
        return Ok(exit_codes::RUN_ABORTED);
    }
    Ok(exit_codes::SUCCESS)
}

fn apply_cli_overrides(settings: &mut RunSettings, args: &RunArgs) {
    if let Some(parallel) = args.parallel {
        settings.parallel = parallel.max(1);
    }
    if let Some(max_turns) = args.max_turns {
        settings.turn_limit = max_turns;
    }
    if let Some(samples) = args.samples {
        settings.samples = Some(samples);
    }
    if let Some(repeat) = args.repeat {
        settings.repeat = repeat.max(1);
    }
    if let Some(temperature) = args.temperature {
        settings.temperature = temperature;
    }
    if let Some(timeout) = args.timeout_seconds {
        settings.timeout_seconds = timeout;
    }
    if args.tasks.is_some() {
        settings.tasks = args.tasks.clone();
    }
    if args.score_model_failures {
        settings.score_model_failures = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: RunArgs,
    }

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec![
            "medbench",
            "--fhir-base",
            "http://localhost:8080/fhir/",
            "--data",
            "cases.json",
            "--functions",
            "funcs.json",
            "--api-key",
            "k",
        ];
        argv.extend_from_slice(extra);
        Wrapper::try_parse_from(argv).expect("parse").args
    }

    fn args_from(argv: &[String]) -> RunArgs {
        Wrapper::try_parse_from(argv).expect("parse").args
    }

    fn base_argv(data: &std::path::Path, functions: &std::path::Path) -> Vec<String> {
        vec![
            "medbench".into(),
            "--fhir-base".into(),
            "http://localhost:8080/fhir/".into(),
            "--data".into(),
            data.display().to_string(),
            "--functions".into(),
            functions.display().to_string(),
            "--api-key".into(),
            "k".into(),
        ]
    }

    fn functions_file(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("functions.json");
        std::fs::write(&path, "[]").expect("write functions");
        path
    }

    #[tokio::test]
    async fn missing_dataset_aborts_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let functions = functions_file(dir.path());
        let argv = base_argv(&dir.path().join("nope.json"), &functions);
        let code = execute(args_from(&argv)).await.expect("execute");
        assert_eq!(code, exit_codes::RUN_ABORTED);
    }

    #[tokio::test]
    async fn empty_dataset_selection_aborts_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let functions = functions_file(dir.path());
        let data = dir.path().join("cases.json");
        std::fs::write(&data, "[]").expect("write dataset");
        let code = execute(args_from(&base_argv(&data, &functions)))
            .await
            .expect("execute");
        assert_eq!(code, exit_codes::RUN_ABORTED);
    }

    #[test]
    fn cli_overrides_beat_file_values() {
        let base = parse_fhir_base("http://localhost:8080/fhir/").expect("base");
        let mut settings = RunSettings::new(base);
        settings.apply_file(&RunConfigFile {
            parallel: Some(2),
            turn_limit: Some(10),
            ..Default::default()
        });
        apply_cli_overrides(&mut settings, &args(&["--parallel", "6", "--repeat", "2"]));

        assert_eq!(settings.parallel, 6);
        assert_eq!(settings.turn_limit, 10);
        assert_eq!(settings.repeat, 2);
    }
}
