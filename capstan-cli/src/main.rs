//! Capstan CLI
//!
//! Command-line interface for interacting with the Capstan controller.

mod commands;
mod config;

use clap::Parser;
use colored::*;
use commands::{Commands, handle_command};
use config::Config;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "capstan")]
#[command(about = "Capstan delivery controller CLI", long_about = None)]
struct Cli {
    /// Controller URL
    #[arg(
        long,
        env = "CAPSTAN_CONTROLLER_URL",
        default_value = "http://localhost:7070"
    )]
    controller_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Usage mistakes count as user errors (exit 1); clap's own exit()
    // would use 2, which is reserved for failed syncs here.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = Config {
        controller_url: cli.controller_url,
    };

    match handle_command(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
