//! Command-line argument definitions for podhost.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for podhost.
#[derive(Debug, Parser)]
#[command(name = "podhost")]
#[command(
    author,
    version,
    about = "Multi-tenant container hosting control plane"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Short name of this host.
    #[arg(long, global = true)]
    pub server_name: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision a new tenant deployment.
    Create(CreateArgs),

    /// Start, stop, restart or recreate a deployment.
    Action(ActionArgs),

    /// Run a shell command inside a deployment.
    Exec(ExecArgs),

    /// Tear down a deployment and release its resources.
    Remove(TenantArgs),

    /// Replace a deployment's basic-auth credential hash.
    RotateCredential(RotateCredentialArgs),

    /// Rebuild proxy fragments for every tenant directory.
    Resync,

    /// List all deployments with their status.
    List,

    /// Count running deployments.
    Count,

    /// Print a deployment's logs.
    Logs(TenantArgs),

    /// Print a one-shot stats sample for a deployment.
    Stats(TenantArgs),

    /// Print whether a deployment is running.
    Status(TenantArgs),
}

/// Arguments naming a single tenant.
#[derive(Debug, Parser)]
pub struct TenantArgs {
    /// Tenant name.
    #[arg(required = true)]
    pub name: String,
}

/// Arguments for the `create` subcommand.
#[derive(Debug, Parser)]
pub struct CreateArgs {
    /// Tenant name.
    #[arg(required = true)]
    pub name: String,

    /// External port published by the deployment.
    #[arg(long, required = true)]
    pub port: String,

    /// Container image; defaults to `tenants.default_image`.
    #[arg(long)]
    pub image: Option<String>,

    /// Basic-auth credential hash; defaults to `tenants.default_credential_hash`.
    #[arg(long)]
    pub credential_hash: Option<String>,
}

/// Arguments for the `action` subcommand.
#[derive(Debug, Parser)]
pub struct ActionArgs {
    /// One of `start`, `stop`, `restart`, `recreate`.
    #[arg(required = true)]
    pub action: String,

    /// Tenant name.
    #[arg(required = true)]
    pub name: String,
}

/// Arguments for the `exec` subcommand.
#[derive(Debug, Parser)]
pub struct ExecArgs {
    /// Tenant name.
    #[arg(required = true)]
    pub name: String,

    /// Command to execute, joined with spaces and run by `bash -c`.
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}

/// Arguments for the `rotate-credential` subcommand.
#[derive(Debug, Parser)]
pub struct RotateCredentialArgs {
    /// Tenant name.
    #[arg(required = true)]
    pub name: String,

    /// New basic-auth credential hash.
    #[arg(long, required = true)]
    pub credential_hash: String,
}
