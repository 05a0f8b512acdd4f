//! Gasoline daemon.
//!
//! One process owns every capture buffer and serves two worlds at once:
//! the browser extension (telemetry posts plus a long-poll command
//! channel) and MCP clients (JSON-RPC over stdio, bridged, or HTTP POST
//! `/mcp`). CI tooling gets `/snapshot`, `/clear`, and `/test-boundary`.
//!
//! Startup binds the listener before any background task runs so a fresh
//! daemon answers `/health` well inside the 600 ms cold-start budget.

pub mod api;
pub mod config;
pub mod elements;
pub mod error;
pub mod logmirror;
pub mod mcp;
pub mod metrics;
pub mod ratelimit;
pub mod recordings;
pub mod state;
pub mod updates;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub use config::ServerConfig;
pub use error::{AppError, AppResult};
pub use mcp::McpDispatcher;
pub use state::AppState;

/// Body cap for telemetry batch posts.
const TELEMETRY_BODY_LIMIT: usize = 4 * 1024 * 1024;
/// Body cap for one performance snapshot.
const PERF_BODY_LIMIT: usize = 256 * 1024;
/// Body cap for tiny control messages.
const CONTROL_BODY_LIMIT: usize = 64 * 1024;
/// Body cap for command results. Recordings ride this route as base64,
/// so the cap must fit a 1 GiB recording after encoding plus the JSON
/// envelope.
const RESULT_BODY_LIMIT: usize = 1536 * 1024 * 1024;
/// Body cap for one JSON-RPC request.
const MCP_BODY_LIMIT: usize = 1024 * 1024;

/// Shared router state: the daemon plus its MCP dispatcher.
#[derive(Clone)]
pub struct ServerHandle {
    /// Daemon state.
    pub state: Arc<AppState>,
    /// Dispatcher backing `/mcp` and the daemon's own stdio.
    pub mcp: Arc<McpDispatcher>,
}

impl ServerHandle {
    /// Build state and dispatcher from configuration.
    pub fn new(config: ServerConfig) -> AppResult<Self> {
        let state = Arc::new(AppState::new(config)?);
        let mcp = Arc::new(McpDispatcher::new(Arc::clone(&state)));
        Ok(Self { state, mcp })
    }
}

/// Build the daemon's router.
pub fn create_router(handle: ServerHandle) -> Router {
    let telemetry = Router::new()
        .route("/logs", post(api::ingest::post_logs))
        .route("/network", post(api::ingest::post_network))
        .route(
            "/network-waterfall",
            post(api::ingest::post_network_waterfall),
        )
        .route(
            "/websocket-events",
            post(api::ingest::post_websocket_events),
        )
        .route("/actions", post(api::ingest::post_actions))
        .route("/extension-logs", post(api::ingest::post_extension_logs))
        .layer(DefaultBodyLimit::max(TELEMETRY_BODY_LIMIT));

    let perf = Router::new()
        .route("/performance", post(api::ingest::post_performance))
        .layer(DefaultBodyLimit::max(PERF_BODY_LIMIT));

    let control = Router::new()
        .route("/sync", post(api::ingest::post_sync))
        .route("/test-boundary", post(api::ci::post_test_boundary))
        .layer(DefaultBodyLimit::max(CONTROL_BODY_LIMIT));

    let results = Router::new()
        .route("/command-result", post(api::ingest::post_command_result))
        .layer(DefaultBodyLimit::max(RESULT_BODY_LIMIT));

    let rpc = Router::new()
        .route("/mcp", post(mcp_http))
        .layer(DefaultBodyLimit::max(MCP_BODY_LIMIT));

    Router::new()
        .route("/health", get(api::health::health_check))
        .route("/next-command", get(api::ingest::next_command))
        .route("/snapshot", get(api::ci::get_snapshot))
        .route("/clear", post(api::ci::clear_all).delete(api::ci::clear_all))
        .merge(telemetry)
        .merge(perf)
        .merge(control)
        .merge(results)
        .merge(rpc)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(handle)
}

async fn mcp_http(
    axum::extract::State(handle): axum::extract::State<ServerHandle>,
    body: Result<axum::Json<gasoline_protocol::JsonRpcRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<axum::Json<gasoline_protocol::JsonRpcResponse>, AppError> {
    let axum::Json(request) = body.map_err(|r| AppError::Validation(r.body_text()))?;
    Ok(axum::Json(handle.mcp.handle_request(request).await))
}

/// Bind the daemon's listener. Binding is the spawn lock: whoever holds
/// the port is the daemon.
pub async fn bind(config: &ServerConfig) -> anyhow::Result<(TcpListener, SocketAddr)> {
    let addr: SocketAddr = config.listen_addr().parse()?;
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}

/// Serve a bound listener until `shutdown` resolves. Background tasks
/// start only after the router is live.
pub async fn serve<F>(
    listener: TcpListener,
    handle: ServerHandle,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(handle.clone());

    handle.state.start_cleanup_task();
    tokio::spawn(updates::version_check_loop(Arc::clone(
        &handle.state.updates,
    )));

    info!(addr = %listener.local_addr()?, "gasoline daemon listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("daemon stopped");
    Ok(())
}

/// Bind and serve in one step.
pub async fn run_with_shutdown<F>(config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let handle = ServerHandle::new(config.clone())?;
    let (listener, _) = bind(&config).await?;
    serve(listener, handle, shutdown).await
}

/// Serve newline-delimited JSON-RPC on this process's stdio against the
/// given dispatcher. Used when the daemon process is also the first MCP
/// client's transport.
pub async fn serve_stdio(dispatcher: Arc<McpDispatcher>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("stdin closed, ending MCP session");
                break;
            }
            Ok(_) => {
                if let Some(response) = dispatcher.handle_line(&line).await {
                    stdout.write_all(response.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
            Err(e) => {
                debug!(error = %e, "stdin read failed");
                break;
            }
        }
    }

    dispatcher.disconnect().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_uses_loopback() {
        let mut config = ServerConfig::default();
        config.port = 0;
        let (listener, addr) = bind(&config).await.unwrap();
        assert!(addr.ip().is_loopback());
        drop(listener);
    }

    #[tokio::test]
    async fn test_second_bind_fails_while_held() {
        let mut config = ServerConfig::default();
        config.port = 0;
        let (listener, addr) = bind(&config).await.unwrap();

        let mut contender = ServerConfig::default();
        contender.port = addr.port();
        assert!(bind(&contender).await.is_err());
        drop(listener);
    }
}
