//! Quiesce CLI - quiesce command

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use watcher::Roles;

mod cmd;
mod daemon;
mod ipc;
mod locks;
mod settings;
mod telemetry;
mod util;

/// Quiesce - process each entity once its change notifications go quiet
#[derive(Parser)]
#[command(name = "quiesce")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (default: ./quiesce.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Run {
        /// Which pipeline tasks to run. Roles split work inside this one
        /// process; the queue and table admit a single process each, so a
        /// second daemon cannot take the other role. A scan-only daemon
        /// refuses enqueue requests.
        #[arg(long, value_enum, default_value_t = Role::All)]
        role: Role,
        /// Write logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Put a change notification on the queue
    Enqueue {
        /// Raw message body, e.g. '{"Id":"abc"}'
        body: Option<String>,
        /// Read one message per line from stdin
        #[arg(long, conflicts_with = "body")]
        stdin: bool,
    },
    /// Show daemon status
    Status,
    /// Stop the daemon
    Stop,
    /// Run one debounce pass now (daemon must be stopped)
    Scan {
        /// List eligible entities without processing them
        #[arg(long)]
        dry_run: bool,
    },
    /// List tracked entities and their phase
    Entities,
    /// Drop an entity's record without processing it
    Forget {
        /// Entity id as it appears in `quiesce entities`
        entity: String,
    },
    /// Print the daemon's counters (metrics_sink = "recorder")
    Metrics,
    /// Show the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    All,
    Ingest,
    Scan,
}

impl From<Role> for Roles {
    fn from(role: Role) -> Self {
        match role {
            Role::All => Roles::default(),
            Role::Ingest => Roles {
                ingest: true,
                scan: false,
            },
            Role::Scan => Roles {
                ingest: false,
                scan: true,
            },
        }
    }
}

/// Install the global subscriber; the guard must live until exit
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let name = path.file_name().context("--log-file must name a file")?;
    std::fs::create_dir_all(dir).context("Failed to create log directory")?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Run { log_file, .. } => log_file.as_deref(),
        _ => None,
    };
    let _guard = init_tracing(log_file)?;

    let config_path = cli.config.as_deref();
    let settings = settings::load(config_path)?;

    match cli.command {
        Commands::Run { role, .. } => cmd::run::run(settings, role.into()).await,
        Commands::Enqueue { body, stdin } => cmd::enqueue::run(&settings, body, stdin).await,
        Commands::Status => cmd::status::run(&settings).await,
        Commands::Stop => cmd::stop::run(&settings).await,
        Commands::Scan { dry_run } => cmd::scan::run(&settings, dry_run).await,
        Commands::Entities => cmd::entities::run(&settings).await,
        Commands::Forget { entity } => cmd::forget::run(&settings, entity).await,
        Commands::Metrics => cmd::metrics::run(&settings).await,
        Commands::Config => cmd::config::run(&settings, config_path).await,
    }
}
