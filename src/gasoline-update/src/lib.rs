//! Update availability checking.
//!
//! A background task in the daemon polls a fixed release endpoint every
//! few hours; when a newer version exists, the MCP dispatcher prepends an
//! update notice to at most one tool response per 24 hours.

mod api;
mod version;

pub use api::{ReleaseClient, ReleaseInfo};
pub use version::{VersionComparison, compare_versions};

use thiserror::Error;

/// The running daemon's version.
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default release endpoint.
pub const RELEASE_URL: &str = "https://releases.gasoline.dev";

/// Result type for update operations.
pub type UpdateResult<T> = std::result::Result<T, UpdateError>;

/// Errors from update checking.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Network-level failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Could not reach the release server.
    #[error("Failed to connect to release server: {message}")]
    ConnectionFailed {
        /// Underlying error text.
        message: String,
    },

    /// Release server responded with an error status.
    #[error("Release server returned error {status}: {message}")]
    ServerError {
        /// HTTP status.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Version string did not parse as semver.
    #[error("Invalid version format: {version}")]
    InvalidVersion {
        /// The offending string.
        version: String,
    },
}
