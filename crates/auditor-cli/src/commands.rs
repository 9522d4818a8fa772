//! Command implementations.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use auditor_core::RiskPlaybook;
use auditor_runtime::{
    InMemoryJobStore, JobEvent, JobRunner, JobStatus, PipelineController, ProviderRegistry,
    RuntimeConfig,
};

use crate::cli::{AuditArgs, OutputFormat};
use crate::document;

/// Run one audit through a job runner, streaming progress to stderr.
pub async fn audit(args: AuditArgs) -> Result<ExitCode> {
    let mut config =
        RuntimeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(playbook) = args.playbook {
        config.playbook_path = playbook;
    }

    let load = RiskPlaybook::load_or_empty(&config.playbook_path);
    if let Some(reason) = &load.degraded {
        eprintln!("warning: auditing with an empty playbook: {}", reason);
    }

    let chain = config
        .build_chain(&ProviderRegistry::with_defaults())
        .context("No LLM provider is usable")?;
    let controller = PipelineController::from_config(&config, Arc::new(chain), &load.playbook);
    let runner = JobRunner::new(
        Arc::new(controller),
        Arc::new(InMemoryJobStore::new()),
        config.max_concurrent_jobs,
    );

    let text = document::read_text(&args.path)?;
    let job = runner.submit_document(text).await?;
    stream_progress(&runner, &job).await?;

    let record = runner.wait(&job).await?;
    match (record.status, record.result) {
        (JobStatus::Completed, Some(result)) => {
            let rendered = match args.format {
                OutputFormat::Markdown => result.report.clone(),
                OutputFormat::Json => serde_json::to_string_pretty(&result)
                    .context("Failed to serialize audit result")?,
            };
            write_output(args.output.as_deref(), &rendered)?;

            if let Some(usage) = record.usage {
                tracing::info!(
                    llm_calls = usage.llm_calls,
                    tokens = usage.total_tokens,
                    estimated_cost = usage.estimated_cost,
                    "LLM usage"
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            eprintln!(
                "✗ Audit failed: {}",
                record.error.as_deref().unwrap_or(&record.message)
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn stream_progress(runner: &JobRunner, job: &auditor_runtime::JobId) -> Result<()> {
    let mut events = runner.store().subscribe(job).await?;

    // The job may have finished before we subscribed.
    if let Some(record) = runner.store().get(job).await {
        if record.status.is_terminal() {
            return Ok(());
        }
    }

    loop {
        match events.recv().await {
            Ok(JobEvent::Progress {
                progress_percent,
                message,
                ..
            }) => eprintln!("[{:>3}%] {}", progress_percent, message),
            Ok(JobEvent::Finished { status, .. }) => {
                eprintln!("[100%] {}", status);
                return Ok(());
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

fn write_output(path: Option<&Path>, contents: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", contents);
            Ok(())
        }
    }
}

/// Report whether a playbook loads cleanly.
pub fn validate_playbook(path: PathBuf) -> Result<ExitCode> {
    match RiskPlaybook::from_file(&path) {
        Ok(playbook) => {
            println!(
                "✓ {} is valid: {} categories, {} toxic patterns",
                path.display(),
                playbook.risk_categories.len(),
                playbook.pattern_count()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("✗ {} would degrade to an empty playbook", path.display());
            println!("  {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print the provider chain in fallback order.
pub fn list_providers(config: Option<PathBuf>) -> Result<ExitCode> {
    let config = RuntimeConfig::load(config.as_deref()).context("Failed to load configuration")?;
    let registry = ProviderRegistry::with_defaults();

    println!("Provider chain (tried in order):");
    for (position, spec) in config.providers.iter().enumerate() {
        let factory_config = spec.factory_config();
        match registry.factory(&spec.provider_type) {
            Ok(factory) => {
                let model = spec
                    .model
                    .as_deref()
                    .or_else(|| factory.default_model(&factory_config))
                    .unwrap_or("-");
                let key = if factory.credential_available(&factory_config) {
                    "key available".to_string()
                } else {
                    format!("missing {}", factory.default_env_var(&factory_config))
                };
                println!(
                    "  {}. {} ({}) model={} [{}]",
                    position + 1,
                    spec.display_name(),
                    spec.provider_type,
                    model,
                    key
                );
            }
            Err(e) => println!("  {}. {} unavailable: {}", position + 1, spec.display_name(), e),
        }
    }

    println!("Compiled provider types: {:?}", registry.available_types());
    Ok(ExitCode::SUCCESS)
}
