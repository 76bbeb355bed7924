//! IPC between CLI and daemon
//!
//! Newline-delimited JSON over a Unix socket at `<state_dir>/daemon.sock`.
//! One request line, one response line; a connection may carry several
//! exchanges.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use quiesce_core::{Disposition, EntityId, EntityState, MessageQueue, StateStore, WriteStrategy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest accepted request line
const MAX_REQUEST_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Put a raw notification body on the queue
    Enqueue { body: String },
    Status,
    /// Snapshot of tracked entity records
    Entities,
    /// Drop one entity record regardless of its phase
    Forget { entity: String },
    /// Counters in Prometheus text format
    Metrics,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Enqueued { message_id: String },
    Status(DaemonStatus),
    Entities { entities: Vec<EntityState> },
    Forgotten { entity: String },
    Metrics { text: String },
    ShuttingDown,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub ingesting: bool,
    pub scanning: bool,
    pub tracked_entities: usize,
    pub pending_messages: usize,
    pub disposition: Disposition,
    pub write_strategy: WriteStrategy,
    pub debounce_window_secs: u64,
    pub continuous_interval_secs: u64,
}

/// What request handlers can reach inside the daemon
#[derive(Clone)]
pub struct DaemonHandle {
    pub store: Arc<dyn StateStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub started_at: DateTime<Utc>,
    pub ingesting: bool,
    pub scanning: bool,
    pub disposition: Disposition,
    pub write_strategy: WriteStrategy,
    pub debounce_window_secs: u64,
    pub continuous_interval_secs: u64,
    /// Present when the `recorder` metrics sink is active
    pub prometheus: Option<PrometheusHandle>,
    pub shutdown: CancellationToken,
}

impl DaemonHandle {
    async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => Response::Error {
                message: format!("{:#}", e),
            },
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::Enqueue { body } => {
                if !self.ingesting {
                    anyhow::bail!("This daemon does not run the ingest role; nothing would drain the queue");
                }
                if body.trim().is_empty() {
                    anyhow::bail!("Refusing to enqueue an empty message");
                }
                let id = self.queue.send(body).await?;
                debug!(message_id = %id, "Enqueued message via IPC");
                Ok(Response::Enqueued {
                    message_id: id.to_string(),
                })
            }
            Request::Status => {
                let uptime = Utc::now().signed_duration_since(self.started_at);
                Ok(Response::Status(DaemonStatus {
                    pid: std::process::id(),
                    started_at: self.started_at,
                    uptime_secs: uptime.num_seconds().max(0) as u64,
                    ingesting: self.ingesting,
                    scanning: self.scanning,
                    tracked_entities: self.store.count().await?,
                    pending_messages: self.queue.pending().await?,
                    disposition: self.disposition,
                    write_strategy: self.write_strategy,
                    debounce_window_secs: self.debounce_window_secs,
                    continuous_interval_secs: self.continuous_interval_secs,
                }))
            }
            Request::Entities => Ok(Response::Entities {
                entities: self.store.list().await?,
            }),
            Request::Forget { entity } => {
                let id = EntityId::new(entity)?;
                self.store.remove(&id).await?;
                info!(entity = %id, "Entity record forgotten via IPC");
                Ok(Response::Forgotten {
                    entity: id.to_string(),
                })
            }
            Request::Metrics => match &self.prometheus {
                Some(handle) => Ok(Response::Metrics {
                    text: handle.render(),
                }),
                None => anyhow::bail!("metrics_sink is `tracing`; counters are written to the log"),
            },
            Request::Shutdown => {
                info!("Shutdown requested via IPC");
                self.shutdown.cancel();
                Ok(Response::ShuttingDown)
            }
        }
    }
}

/// IPC server for the daemon
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcServer {
    /// Bind the control socket, replacing a leftover socket file
    pub fn bind(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind control socket {}", path.display()))?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept connections until the handle's shutdown token fires
    ///
    /// The socket file is left in place; the daemon removes it once the
    /// pipeline has fully stopped, so its disappearance means "stopped".
    pub async fn serve(self, handle: DaemonHandle) {
        let shutdown = handle.shutdown.clone();
        info!(socket = %self.path.display(), "IPC server listening");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let handle = handle.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, handle).await {
                                debug!(error = %e, "IPC connection closed with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept IPC connection"),
                },
            }
        }

        debug!("IPC server stopped");
    }
}

async fn serve_connection(stream: UnixStream, handle: DaemonHandle) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_REQUEST_BYTES as u64 + 1)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Ok(());
        }

        if line.len() > MAX_REQUEST_BYTES {
            // Rest of the oversized line is still unread; the stream cannot be resynced
            let response = Response::Error {
                message: format!("request exceeds {} bytes", MAX_REQUEST_BYTES),
            };
            write_response(&mut write_half, &response).await?;
            return Ok(());
        }

        let response = match serde_json::from_str::<Request>(line.trim_end()) {
            Ok(request) => handle.handle(request).await,
            Err(e) => Response::Error {
                message: format!("invalid request: {}", e),
            },
        };
        write_response(&mut write_half, &response).await?;
    }
}

async fn write_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response: &Response,
) -> Result<()> {
    let mut encoded = serde_json::to_vec(response)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    Ok(())
}

/// IPC client for talking to a running daemon
pub struct IpcClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl IpcClient {
    /// Connect to the daemon's control socket
    pub async fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("Daemon not reachable at {}", path.display()))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Send one request and wait for its response
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        let mut encoded = serde_json::to_vec(request)?;
        encoded.push(b'\n');
        self.writer.write_all(&encoded).await?;

        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(anyhow!("Daemon closed the connection"));
        }
        let response = serde_json::from_str(line.trim_end()).context("Malformed daemon response")?;
        Ok(response)
    }

    pub async fn enqueue(&mut self, body: String) -> Result<String> {
        match self.request(&Request::Enqueue { body }).await? {
            Response::Enqueued { message_id } => Ok(message_id),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&mut self) -> Result<DaemonStatus> {
        match self.request(&Request::Status).await? {
            Response::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub async fn entities(&mut self) -> Result<Vec<EntityState>> {
        match self.request(&Request::Entities).await? {
            Response::Entities { entities } => Ok(entities),
            other => Err(unexpected(other)),
        }
    }

    pub async fn forget(&mut self, entity: &str) -> Result<()> {
        let request = Request::Forget {
            entity: entity.to_string(),
        };
        match self.request(&request).await? {
            Response::Forgotten { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn metrics(&mut self) -> Result<String> {
        match self.request(&Request::Metrics).await? {
            Response::Metrics { text } => Ok(text),
            other => Err(unexpected(other)),
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        match self.request(&Request::Shutdown).await? {
            Response::ShuttingDown => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> anyhow::Error {
    match response {
        Response::Error { message } => anyhow!("Daemon error: {}", message),
        other => anyhow!("Unexpected daemon response: {:?}", other),
    }
}
