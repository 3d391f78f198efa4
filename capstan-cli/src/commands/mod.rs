//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod application;
mod pipeline;
mod sync;

pub use application::CreateApplicationArgs;
pub use pipeline::RunPipelineArgs;
pub use sync::SyncArgs;

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

use crate::config::Config;

/// Exit code when the requested operation ran but finished unhealthy
/// (failed sync pass, failed or still-pending awaited build)
pub const EXIT_SYNC_FAILURE: u8 = 2;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Register a new application
    CreateApplication(CreateApplicationArgs),
    /// List all registered applications
    ListApplications,
    /// Trigger a reconciliation pass and report the outcome
    Sync(SyncArgs),
    /// Show declaration, sync state and latest pipeline run of an application
    GetStatus {
        /// Application name
        name: String,

        /// Print the raw status report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an application registration
    DeleteApplication {
        /// Application name
        name: String,

        /// Also delete the objects the application owns
        #[arg(long)]
        cascade: bool,
    },
    /// Submit a pipeline run
    RunPipeline(RunPipelineArgs),
    /// Get pipeline run details
    GetRun {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// List submitted pipeline runs
    ListRuns {
        /// Only show runs linked to this application
        #[arg(long)]
        application: Option<String>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
///
/// # Returns
/// The exit code the process should finish with
pub async fn handle_command(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::CreateApplication(args) => application::create_application(config, args).await,
        Commands::ListApplications => application::list_applications(config).await,
        Commands::Sync(args) => sync::sync_application(config, args).await,
        Commands::GetStatus { name, json } => sync::get_status(config, &name, json).await,
        Commands::DeleteApplication { name, cascade } => {
            application::delete_application(config, &name, cascade).await
        }
        Commands::RunPipeline(args) => pipeline::run_pipeline(config, args).await,
        Commands::GetRun { id } => pipeline::get_run(config, &id).await,
        Commands::ListRuns { application } => {
            pipeline::list_runs(config, application.as_deref()).await
        }
    }
}
