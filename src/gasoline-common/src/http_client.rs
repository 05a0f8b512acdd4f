//! Centralized HTTP client factory for Gasoline.
//!
//! Provides factory functions to create HTTP clients with consistent
//! configuration:
//! - `create_default_client()` - Standard 30s timeout
//! - `create_health_check_client()` - 5s timeout for daemon probes
//! - `create_client_with_timeout(duration)` - Custom timeout
//!
//! All clients include: User-Agent, tcp_nodelay, and a read timeout.

use std::time::Duration;

use reqwest::Client;

/// User-Agent string for all HTTP requests
pub const USER_AGENT: &str = concat!("gasoline/", env!("CARGO_PKG_VERSION"));

/// Default timeout for standard API requests (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Short timeout for daemon health probes (5 seconds)
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool idle timeout so DNS is re-resolved periodically.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Creates an HTTP client with default configuration (30s timeout).
pub fn create_default_client() -> Result<Client, String> {
    create_client_with_timeout(DEFAULT_TIMEOUT)
}

/// Creates an HTTP client for daemon health probes (5s timeout).
pub fn create_health_check_client() -> Result<Client, String> {
    create_client_with_timeout(HEALTH_CHECK_TIMEOUT)
}

/// Creates an HTTP client with a custom timeout.
///
/// All clients include:
/// - User-Agent: `gasoline/{version}`
/// - tcp_nodelay: true (for lower latency)
/// - pool_idle_timeout: 60s
/// - Read timeout to prevent hangs on Content-Length mismatches
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client, String> {
    let read_timeout = timeout.min(Duration::from_secs(60));

    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .read_timeout(read_timeout)
        .tcp_nodelay(true)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {e}"))
}
