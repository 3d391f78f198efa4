//! Sync and status command handlers
//!
//! Triggers reconciliation passes and renders status reports.

use anyhow::Result;
use clap::Args;
use colored::*;
use std::process::ExitCode;

use capstan_core::domain::sync::{Health, ResourceAction, ResourceOutcome, SyncPhase, SyncStatus};
use capstan_core::dto::status::StatusReport;
use capstan_core::dto::sync::{SyncReport, SyncRequest};

use crate::commands::EXIT_SYNC_FAILURE;
use crate::config::Config;

/// Arguments for `sync`
#[derive(Args)]
pub struct SyncArgs {
    /// Application name
    pub name: String,

    /// Delete orphaned objects this pass, regardless of policy
    #[arg(long)]
    pub prune: bool,

    /// Compute and print the diff without touching live objects
    #[arg(long)]
    pub dry_run: bool,
}

/// Trigger a reconciliation pass and wait for its report
pub async fn sync_application(config: &Config, args: SyncArgs) -> Result<ExitCode> {
    let client = config.client();

    let request = SyncRequest {
        prune: args.prune.then_some(true),
        dry_run: args.dry_run,
    };

    match client.sync_application(&args.name, request).await {
        Ok(report) => {
            print_sync_report(&report);
            if report.succeeded() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_SYNC_FAILURE))
            }
        }
        // An unknown application or a rejected request is the caller's
        // mistake; anything else means the pass could not complete.
        Err(e) if e.is_client_error() => Err(e.into()),
        Err(e) => {
            eprintln!("{} {}", "✗ Sync failed:".red().bold(), e);
            Ok(ExitCode::from(EXIT_SYNC_FAILURE))
        }
    }
}

/// Show the aggregated status of an application
pub async fn get_status(config: &Config, name: &str, json: bool) -> Result<ExitCode> {
    let client = config.client();
    let status = client.get_status(name).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_status_report(&status);
    }

    Ok(ExitCode::SUCCESS)
}

/// Print the report of a finished pass
fn print_sync_report(report: &SyncReport) {
    if report.dry_run {
        println!(
            "{}",
            "Dry run: no live objects were modified.".yellow().bold()
        );
    }

    if report.succeeded() {
        println!(
            "{}",
            format!("✓ Sync of {} completed", report.application)
                .green()
                .bold()
        );
    } else {
        println!(
            "{}",
            format!("✗ Sync of {} failed", report.application).red().bold()
        );
    }

    if let Some(fp) = &report.fingerprint {
        println!("  Revision: {}", fp.short().cyan());
    }
    println!("  Phase:    {}", colorize_phase(report.phase));
    println!("  Health:   {}", colorize_health(report.health));
    if let Some(message) = &report.message {
        println!("  Message:  {}", message.red());
    }

    print_resource_outcomes(&report.resources);
}

/// Print an aggregated status report
fn print_status_report(status: &StatusReport) {
    let app = &status.application;

    println!("{}", "Application:".bold());
    println!("  Name:       {}", app.name.bold());
    println!("  Repository: {}", app.repo_url);
    println!("  Revision:   {}", app.target_revision);
    println!("  Namespace:  {}", app.dest_namespace);
    println!(
        "  Policy:     {} (self-heal: {}, prune: {})",
        app.sync_policy.mode, app.sync_policy.self_heal, app.sync_policy.prune
    );

    println!("\n{}", "Sync:".bold());
    print_sync_status(&status.sync);

    if let Some(run) = &status.latest_run {
        println!("\n{}", "Latest pipeline run:".bold());
        super::pipeline::print_run_summary(run);
    }
}

/// Print the sync record of an application
fn print_sync_status(sync: &SyncStatus) {
    println!("  Phase:      {}", colorize_phase(sync.phase));
    println!("  Health:     {}", colorize_health(sync.health));
    if let Some(fp) = &sync.last_attempted {
        println!("  Attempted:  {}", fp.short().cyan());
    }
    if let Some(fp) = &sync.last_synced {
        println!("  Synced:     {}", fp.short().cyan());
    }
    if let Some(error) = &sync.last_error {
        println!("  Last error: {}", error.red());
    }
    println!(
        "  Observed:   {}",
        sync.observed_at.format("%Y-%m-%d %H:%M:%S")
    );

    print_resource_outcomes(&sync.resources);
}

/// Print per-object outcomes, one line each
fn print_resource_outcomes(resources: &[ResourceOutcome]) {
    if resources.is_empty() {
        return;
    }

    println!("\n{}", "Resources:".bold());
    for outcome in resources {
        print!("  {} {}", colorize_action(outcome.action), outcome.key);
        match &outcome.message {
            Some(message) => println!("  {}", message.dimmed()),
            None => println!(),
        }
    }
}

/// Colorize a sync phase for display
fn colorize_phase(phase: SyncPhase) -> colored::ColoredString {
    let s = phase.to_string();
    match phase {
        SyncPhase::Idle => s.dimmed(),
        SyncPhase::Diffing | SyncPhase::Applying => s.cyan(),
        SyncPhase::ConflictRetry => s.yellow(),
        SyncPhase::Settled => s.green(),
        SyncPhase::Failed => s.red(),
    }
}

/// Colorize a health classification for display
fn colorize_health(health: Health) -> colored::ColoredString {
    let s = health.to_string();
    match health {
        Health::Healthy => s.green(),
        Health::Progressing => s.cyan(),
        Health::Degraded => s.red(),
        Health::Unknown => s.yellow(),
    }
}

/// Colorize a resource action for display, padded for alignment
fn colorize_action(action: ResourceAction) -> colored::ColoredString {
    let padded = format!("{:<12}", action.to_string());
    match action {
        ResourceAction::Created => padded.green(),
        ResourceAction::Updated => padded.cyan(),
        ResourceAction::Pruned | ResourceAction::PruneSkipped => padded.yellow(),
        ResourceAction::Unchanged => padded.dimmed(),
        ResourceAction::Failed => padded.red(),
    }
}
