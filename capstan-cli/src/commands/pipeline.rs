//! Pipeline run command handlers
//!
//! Submits builds and inspects their runs.

use anyhow::{Context, Result, anyhow};
use clap::Args;
use colored::*;
use std::process::ExitCode;
use uuid::Uuid;

use capstan_client::ControllerClient;
use capstan_core::domain::run::{PipelineRun, RunOutcome};
use capstan_core::dto::run::SubmitRun;

use crate::commands::EXIT_SYNC_FAILURE;
use crate::config::Config;

/// Arguments for `run-pipeline`
#[derive(Args)]
pub struct RunPipelineArgs {
    /// Source reference to build (e.g. refs/heads/main)
    #[arg(long)]
    pub source_ref: String,

    /// Image tag the build should produce
    #[arg(long)]
    pub image_tag: String,

    /// Application to refresh once the build succeeds
    #[arg(long)]
    pub application: Option<String>,

    /// Block until the run reaches a terminal outcome
    #[arg(long)]
    pub wait: bool,

    /// How long to wait before giving up
    #[arg(long, default_value = "60")]
    pub timeout_secs: u64,
}

/// Submit a pipeline run, optionally waiting for its outcome
pub async fn run_pipeline(config: &Config, args: RunPipelineArgs) -> Result<ExitCode> {
    let client = config.client();

    let run = client
        .submit_run(SubmitRun {
            source_ref: args.source_ref,
            image_tag: args.image_tag,
            application: args.application,
        })
        .await?;

    println!("{}", "✓ Pipeline run submitted!".green().bold());
    println!("  Run ID: {}", run.id.to_string().cyan());

    if !args.wait {
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{}",
        format!("  Waiting up to {}s...", args.timeout_secs).dimmed()
    );
    let run = client.wait_run(run.id, args.timeout_secs).await?;

    println!();
    print_run_details(&run);

    match run.outcome {
        RunOutcome::Succeeded => Ok(ExitCode::SUCCESS),
        RunOutcome::Failed => Ok(ExitCode::from(EXIT_SYNC_FAILURE)),
        RunOutcome::Pending => {
            eprintln!(
                "{}",
                format!("✗ Run still pending after {}s", args.timeout_secs).red()
            );
            Ok(ExitCode::from(EXIT_SYNC_FAILURE))
        }
    }
}

/// Get and display a single run
pub async fn get_run(config: &Config, id: &str) -> Result<ExitCode> {
    let client = config.client();
    let run_id = resolve_run_id(&client, id).await?;

    let run = client.get_run(run_id).await?;

    print_run_details(&run);

    Ok(ExitCode::SUCCESS)
}

/// List submitted runs
pub async fn list_runs(config: &Config, application: Option<&str>) -> Result<ExitCode> {
    let client = config.client();
    let runs = client.list_runs(application).await?;

    if runs.is_empty() {
        println!("{}", "No pipeline runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in runs {
            print_run_summary(&run);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Resolve a run ID or unambiguous prefix to a full UUID
///
/// Allows users to specify short prefixes instead of full UUIDs.
///
/// # Errors
/// Returns an error if no run matches the prefix, or if the prefix is
/// ambiguous.
async fn resolve_run_id(client: &ControllerClient, input: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }

    let prefix = input.to_lowercase();

    let runs = client
        .list_runs(None)
        .await
        .context("Failed to fetch runs for ID resolution")?;

    let matches: Vec<_> = runs
        .iter()
        .filter(|r| r.id.to_string().starts_with(&prefix))
        .collect();

    match matches.len() {
        0 => Err(anyhow!("No run found with ID starting with '{}'", prefix)),
        1 => Ok(matches[0].id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|r| r.id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple runs: {}",
                prefix,
                ids.join(", ")
            ))
        }
    }
}

/// Print a run summary
pub(crate) fn print_run_summary(run: &PipelineRun) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Source:    {}", run.source_ref.dimmed());
    println!("    Image:     {}", run.image_tag.dimmed());
    println!("    Outcome:   {}", colorize_outcome(run.outcome));
    if let Some(app) = &run.application {
        println!("    Application: {}", app.dimmed());
    }
    println!(
        "    Submitted: {}",
        run.submitted_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

/// Print detailed run information
fn print_run_details(run: &PipelineRun) {
    println!("{}", "Run Details:".bold());
    println!("  ID:        {}", run.id.to_string().cyan());
    println!("  Source:    {}", run.source_ref);
    println!("  Image tag: {}", run.image_tag);
    if let Some(app) = &run.application {
        println!("  Application: {}", app);
    }
    println!("  Outcome:   {}", colorize_outcome(run.outcome));
    println!(
        "  Submitted: {}",
        run.submitted_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(finished) = run.finished_at {
        println!("  Finished:  {}", finished.format("%Y-%m-%d %H:%M:%S"));

        let duration = finished.signed_duration_since(run.submitted_at);
        println!("  Duration:  {}s", duration.num_seconds());
    }

    if let Some(digest) = &run.image_digest {
        println!("  Digest:    {}", digest.green());
    }

    if let Some(error) = &run.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

/// Colorize a run outcome for display
fn colorize_outcome(outcome: RunOutcome) -> colored::ColoredString {
    let s = outcome.to_string();
    match outcome {
        RunOutcome::Pending => s.yellow(),
        RunOutcome::Succeeded => s.green(),
        RunOutcome::Failed => s.red(),
    }
}
