//! Daemon lifecycle
//!
//! Opens the table and queue, takes the scanner lock when scanning, runs
//! the pipeline and the control socket, and shuts everything down on
//! SIGINT, SIGTERM or an IPC `shutdown` request.

use crate::ipc::{DaemonHandle, IpcClient, IpcServer};
use crate::locks::ScannerLock;
use anyhow::{Context, Result};
use chrono::Utc;
use journal::{SledQueue, SledStateStore};
use quiesce_core::{MetricsSinkKind, Settings, SystemClock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use watcher::{
    CommandProcessor, LogProcessor, MetricsSink, Pipeline, Processor, RecorderSink, Roles,
    Services, TracingSink,
};

/// How long `stop` waits for the socket to disappear
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the daemon in the foreground until a shutdown signal
pub async fn run(settings: Settings, roles: Roles) -> Result<()> {
    settings.validate().context("Invalid configuration")?;
    if is_running(&settings.socket_path()).await {
        anyhow::bail!(
            "Daemon already running (control socket {})",
            settings.socket_path().display()
        );
    }
    std::fs::create_dir_all(&settings.state_dir).context("Failed to create state directory")?;

    let lock = if roles.scan {
        Some(ScannerLock::acquire(&settings.locks_dir())?)
    } else {
        None
    };

    let services = open_services(&settings)?;
    let shutdown = CancellationToken::new();
    let pipeline = Pipeline::spawn(services.clone(), &settings, roles, shutdown.clone())?;

    let handle = DaemonHandle {
        store: services.store.clone(),
        queue: services.queue.clone(),
        started_at: Utc::now(),
        ingesting: roles.ingest,
        scanning: roles.scan,
        disposition: settings.disposition,
        write_strategy: settings.write_strategy,
        debounce_window_secs: settings.debounce_window_secs,
        continuous_interval_secs: settings.continuous_interval_secs,
        prometheus: crate::telemetry::prometheus_handle(),
        shutdown: shutdown.clone(),
    };
    let server = IpcServer::bind(&settings.socket_path())?;
    let server = tokio::spawn(server.serve(handle));

    info!(
        pid = std::process::id(),
        disposition = ?settings.disposition,
        state_dir = %settings.state_dir.display(),
        "Daemon running"
    );

    wait_for_shutdown(&shutdown).await?;
    info!("Shutting down");
    shutdown.cancel();

    pipeline.wait().await;
    if let Err(e) = server.await {
        warn!(error = %e, "IPC server task failed");
    }
    drop(services);
    if let Some(lock) = lock {
        lock.release()?;
    }
    remove_socket(&settings.socket_path());

    info!("Daemon stopped");
    Ok(())
}

/// Open the sled table and queue and build the configured collaborators
pub fn open_services(settings: &Settings) -> Result<Services> {
    let (table, queue) = match (&settings.table, &settings.queue) {
        (Some(table), Some(queue)) => (table, queue),
        _ => anyhow::bail!("Both table and queue must be configured"),
    };

    let store = SledStateStore::open(table)
        .with_context(|| format!("Failed to open table at {} (is the daemon running?)", table.display()))?;
    let queue = SledQueue::open(queue, settings.visibility_timeout())
        .with_context(|| format!("Failed to open queue at {} (is the daemon running?)", queue.display()))?;

    Ok(Services {
        store: Arc::new(store),
        queue: Arc::new(queue),
        processor: build_processor(settings)?,
        metrics: build_metrics(settings)?,
        clock: Arc::new(SystemClock),
    })
}

/// Open only the table (offline commands)
pub fn open_table(settings: &Settings) -> Result<SledStateStore> {
    let table = settings
        .table
        .as_deref()
        .context("table is not set (QUIESCE_TABLE)")?;
    SledStateStore::open(table)
        .with_context(|| format!("Failed to open table at {} (is the daemon running?)", table.display()))
}

pub fn build_processor(settings: &Settings) -> Result<Arc<dyn Processor>> {
    match &settings.process_command {
        Some(line) => {
            let processor = CommandProcessor::from_command_line(line, settings.process_timeout())?;
            Ok(Arc::new(processor))
        }
        None => Ok(Arc::new(LogProcessor)),
    }
}

/// Tracing sink, or the `metrics` facade backed by the Prometheus recorder
pub fn build_metrics(settings: &Settings) -> Result<Arc<dyn MetricsSink>> {
    match settings.metrics_sink {
        MetricsSinkKind::Tracing => Ok(Arc::new(TracingSink)),
        MetricsSinkKind::Recorder => {
            crate::telemetry::init_metrics()?;
            Ok(Arc::new(RecorderSink::register()))
        }
    }
}

async fn wait_for_shutdown(shutdown: &CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to register SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
        _ = shutdown.cancelled() => {}
    }
    Ok(())
}

fn remove_socket(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(socket = %path.display(), error = %e, "Failed to remove control socket");
        }
    }
}

/// Whether a daemon answers on the control socket
pub async fn is_running(socket: &Path) -> bool {
    match IpcClient::connect(socket).await {
        Ok(mut client) => client.status().await.is_ok(),
        Err(_) => false,
    }
}

/// Ask a running daemon to stop and wait until it has
pub async fn stop(socket: &Path) -> Result<bool> {
    let mut client = match IpcClient::connect(socket).await {
        Ok(client) => client,
        Err(_) => return Ok(false),
    };
    client.shutdown().await?;

    let deadline = tokio::time::Instant::now() + STOP_TIMEOUT;
    while socket.exists() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("Daemon did not stop within {}s", STOP_TIMEOUT.as_secs());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(true)
}
