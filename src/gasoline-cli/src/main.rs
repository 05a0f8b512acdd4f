//! Gasoline CLI entry point.
//!
//! The first client to start becomes the daemon; later clients discover
//! the running daemon over `/health` and bridge their stdio to it. The
//! TCP bind is the spawn lock, so a crashed daemon is recovered by
//! whichever client starts next.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gasoline_common::create_health_check_client;
use gasoline_protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use gasoline_server::{ServerConfig, ServerHandle, bind, serve, serve_stdio};

/// Retries while a sibling holds the spawn lock.
const SPAWN_RETRIES: u32 = 3;

/// First backoff step; doubles up to `BACKOFF_MAX`.
const BACKOFF_START: Duration = Duration::from_millis(100);

/// Backoff ceiling.
const BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Gasoline developer-console daemon
#[derive(Parser)]
#[command(name = "gasoline")]
#[command(about = "Local daemon bridging browser telemetry to MCP clients")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Daemon port on loopback
    #[arg(long, env = "GASOLINE_PORT")]
    port: Option<u16>,

    /// Append-only JSONL mirror of console entries
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log level for daemon diagnostics (stderr)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the foreground without an MCP stdio session
    Serve,
}

/// Diagnostics go to stderr: stdout is the MCP channel.
fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_config(args: &Args) -> ServerConfig {
    let mut config = ServerConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = &args.log_file {
        config.log_file = Some(path.clone());
    }
    config
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Probe the daemon's `/health`; 200 means a live daemon owns the port.
async fn probe_health(client: &reqwest::Client, port: u16) -> bool {
    let url = format!("http://127.0.0.1:{port}/health");
    matches!(client.get(&url).send().await, Ok(r) if r.status().is_success())
}

/// Connect-or-spawn: probe, race for the bind, back off behind siblings.
async fn connect_or_spawn(config: ServerConfig) -> anyhow::Result<()> {
    let client = create_health_check_client()
        .map_err(|e| anyhow::anyhow!("building health client: {e}"))?;
    let port = config.port;

    // Step 1: a live daemon wins immediately.
    if probe_health(&client, port).await {
        info!(port, "daemon already running, entering bridge mode");
        return bridge_stdio(port).await;
    }

    // Step 2: race for the spawn lock. Binding the port IS the lock.
    match try_become_daemon(config).await? {
        Some(()) => return Ok(()),
        None => debug!(port, "spawn lock held by a sibling, backing off"),
    }

    // Step 3: a sibling is starting the daemon; re-probe with backoff.
    let mut backoff = BACKOFF_START;
    for attempt in 0..SPAWN_RETRIES {
        tokio::time::sleep(backoff).await;
        if probe_health(&client, port).await {
            info!(port, attempt, "daemon came up, entering bridge mode");
            return bridge_stdio(port).await;
        }
        backoff = (backoff * 2).min(BACKOFF_MAX);
    }

    // Step 4: nothing answered.
    error!(
        port,
        retries = SPAWN_RETRIES,
        "no daemon answered /health and the port could not be bound"
    );
    anyhow::bail!(
        "could not connect to or spawn the gasoline daemon on port {port}; \
         check for a wedged process holding the port"
    )
}

/// Try to bind the port and become the daemon. `Ok(None)` means a
/// sibling holds the bind.
async fn try_become_daemon(config: ServerConfig) -> anyhow::Result<Option<()>> {
    let (listener, addr) = match bind(&config).await {
        Ok(bound) => bound,
        Err(_) => return Ok(None),
    };

    info!(addr = %addr, "became the daemon");
    let handle = ServerHandle::new(config)?;
    let dispatcher = Arc::clone(&handle.mcp);

    let server = tokio::spawn(serve(listener, handle, shutdown_signal()));

    // Serve this client's own MCP session against the in-process
    // dispatcher. When stdin closes the daemon keeps running for other
    // clients until a signal arrives.
    if let Err(e) = serve_stdio(dispatcher).await {
        warn!(error = %e, "stdio session ended with error");
    } else {
        info!("stdio session ended; daemon continues for other clients");
    }

    server.await??;
    Ok(Some(()))
}

/// Bridge newline-delimited stdio JSON-RPC to the daemon's HTTP `/mcp`.
async fn bridge_stdio(port: u16) -> anyhow::Result<()> {
    let client = gasoline_common::create_default_client()
        .map_err(|e| anyhow::anyhow!("building bridge client: {e}"))?;
    let url = format!("http://127.0.0.1:{port}/mcp");

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let Ok(request) = serde_json::from_str::<JsonRpcRequest>(trimmed) else {
                    // Notifications need no response; anything else
                    // unparseable is dropped with a note.
                    debug!(line = %trimmed, "non-request line not forwarded");
                    continue;
                };

                let request_id = request.id.clone();
                let response = match client.post(&url).json(&request).send().await {
                    Ok(http) => match http.json::<JsonRpcResponse>().await {
                        Ok(response) => response,
                        Err(e) => JsonRpcResponse::error(
                            request_id,
                            JsonRpcError::internal_error(format!("daemon response: {e}")),
                        ),
                    },
                    Err(e) => JsonRpcResponse::error(
                        request_id,
                        JsonRpcError::internal_error(format!("daemon unreachable: {e}")),
                    ),
                };

                let serialized = serde_json::to_string(&response)?;
                stdout.write_all(serialized.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(&args.log_level, args.json_logs);

    let config = build_config(&args);

    let result = match args.command {
        Some(Command::Serve) => {
            info!(port = config.port, "starting daemon in foreground");
            gasoline_server::run_with_shutdown(config, shutdown_signal()).await
        }
        None => connect_or_spawn(config).await,
    };

    if let Err(e) = result {
        error!("fatal: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
