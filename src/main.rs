//! `podhost` application entry point.
//!
//! This binary is a thin adapter over [`podhost::api::HostService`]. It uses
//! `eyre` for opaque error handling at the application boundary, converting
//! domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/podhost/config.toml` or path from `PODHOST_CONFIG_PATH`)
//! 3. Environment variables (`PODHOST_*`)
//! 4. Command-line arguments
//!
//! Mutating subcommands submit a task, poll it until it finishes and print
//! the task record as JSON. The process exits non-zero when the task failed.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use podhost::api::{CreateParams, HostService};
use podhost::config::{AppConfig, Cli, Commands, load_config};
use podhost::error::ContainerError;
use podhost::tasks::{TaskId, TaskStatus};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Interval between task status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Application entry point.
///
/// Loads configuration, connects to the container engine and dispatches to
/// the subcommand handler.
fn main() -> EyreResult<ExitCode> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "podhost=info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        Report::from(ContainerError::RuntimeCreationFailed {
            message: e.to_string(),
        })
    })?;
    runtime.block_on(run(&cli, &config))
}

/// Execute the CLI command against a connected service.
async fn run(cli: &Cli, config: &AppConfig) -> EyreResult<ExitCode> {
    let host = HostService::connect(config, &DefaultEnv::new()).await?;

    let task_id = match &cli.command {
        Commands::Create(args) => {
            host.submit_create(CreateParams {
                name: &args.name,
                port: &args.port,
                image: args.image.as_deref(),
                credential_hash: args.credential_hash.as_deref(),
            })
            .await?
        }
        Commands::Action(args) => host.submit_action(&args.action, &args.name).await?,
        Commands::Exec(args) => host.submit_exec(&args.name, &args.command.join(" ")).await?,
        Commands::Remove(args) => host.submit_remove(&args.name).await?,
        Commands::RotateCredential(args) => {
            host.submit_rotate_credential(&args.name, &args.credential_hash)
                .await?
        }
        Commands::Resync => host.resync_vhosts().await?,
        Commands::List => return print_json(&host.list_deployments().await?),
        Commands::Count => {
            let running = host.count_running().await?;
            return print_json(&serde_json::json!({ "running": running }));
        }
        Commands::Logs(args) => {
            print_text(&host.get_logs(&args.name).await?);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Stats(args) => return print_json(&host.get_stats(&args.name).await?),
        Commands::Status(args) => {
            let status = host.get_status(&args.name).await?;
            return print_json(&serde_json::json!({ "status": status }));
        }
    };

    await_task(&host, task_id).await
}

/// Poll a task until it finishes, print its record and map its status to
/// an exit code.
async fn await_task(host: &HostService, task_id: TaskId) -> EyreResult<ExitCode> {
    loop {
        let Some(record) = host.get_task(task_id).await else {
            return Err(eyre::eyre!("task {task_id} disappeared"));
        };
        if record.is_finished() {
            host.shutdown().await?;
            print_json(&record)?;
            return Ok(if record.status == TaskStatus::Failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_json(value: &impl Serialize) -> EyreResult<ExitCode> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::SUCCESS)
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_text(text: &str) {
    print!("{text}");
}
