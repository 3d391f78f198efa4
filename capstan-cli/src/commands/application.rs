//! Application command handlers
//!
//! Handles registration, listing and removal of applications.

use anyhow::Result;
use clap::Args;
use colored::*;
use std::process::ExitCode;

use capstan_core::domain::application::{Application, SyncMode, SyncPolicy};
use capstan_core::dto::application::CreateApplication;

use crate::config::Config;

/// Arguments for `create-application`
#[derive(Args)]
pub struct CreateApplicationArgs {
    /// Application name (a DNS label, e.g. "shop")
    pub name: String,

    /// Git repository URL holding the manifests
    #[arg(long)]
    pub repo_url: String,

    /// Directory inside the repository to render
    #[arg(long, default_value = "")]
    pub path: String,

    /// Branch, tag or commit to track
    #[arg(long, default_value = "main")]
    pub target_revision: String,

    /// Namespace the rendered objects land in
    #[arg(long)]
    pub dest_namespace: String,

    /// Apply observed source changes without a manual sync
    #[arg(long)]
    pub automated: bool,

    /// Revert out-of-band edits to live objects
    #[arg(long)]
    pub self_heal: bool,

    /// Delete live objects that disappear from the source
    #[arg(long)]
    pub prune: bool,
}

/// Register a new application with the controller
pub async fn create_application(config: &Config, args: CreateApplicationArgs) -> Result<ExitCode> {
    let client = config.client();

    let mode = if args.automated {
        SyncMode::Automated
    } else {
        SyncMode::Manual
    };

    let app = client
        .create_application(CreateApplication {
            name: args.name,
            repo_url: args.repo_url,
            path: args.path,
            target_revision: args.target_revision,
            dest_namespace: args.dest_namespace,
            sync_policy: SyncPolicy {
                mode,
                self_heal: args.self_heal,
                prune: args.prune,
            },
        })
        .await?;

    println!("{}", "✓ Application created successfully!".green().bold());
    print_application_details(&app);

    Ok(ExitCode::SUCCESS)
}

/// List all registered applications
pub async fn list_applications(config: &Config) -> Result<ExitCode> {
    let client = config.client();
    let apps = client.list_applications().await?;

    if apps.is_empty() {
        println!("{}", "No applications found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} application(s):", apps.len()).bold()
        );
        println!();
        for app in apps {
            print_application_summary(&app);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Delete an application registration
pub async fn delete_application(config: &Config, name: &str, cascade: bool) -> Result<ExitCode> {
    let client = config.client();
    client.delete_application(name, cascade).await?;

    println!(
        "{}",
        format!("✓ Application {} deleted successfully!", name)
            .green()
            .bold()
    );
    if cascade {
        println!("{}", "  Owned objects were deleted as well.".dimmed());
    }

    Ok(ExitCode::SUCCESS)
}

/// Print an application summary
fn print_application_summary(app: &Application) {
    println!("  {} {}", "▸".cyan(), app.name.bold());
    println!("    Repository: {}", app.repo_url.dimmed());
    println!("    Revision:   {}", app.target_revision.dimmed());
    println!("    Namespace:  {}", app.dest_namespace.dimmed());
    println!(
        "    Mode:       {}",
        app.sync_policy.mode.to_string().dimmed()
    );
    println!();
}

/// Print detailed application information
fn print_application_details(app: &Application) {
    println!("  Name:       {}", app.name.bold());
    println!("  Repository: {}", app.repo_url);
    println!(
        "  Path:       {}",
        if app.path.is_empty() { "." } else { &app.path }
    );
    println!("  Revision:   {}", app.target_revision);
    println!("  Namespace:  {}", app.dest_namespace);
    println!(
        "  Policy:     {} (self-heal: {}, prune: {})",
        app.sync_policy.mode, app.sync_policy.self_heal, app.sync_policy.prune
    );
    println!(
        "  Created:    {}",
        app.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}
