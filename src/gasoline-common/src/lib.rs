//! Common utilities shared across Gasoline crates.

pub mod dirs;
pub mod http_client;
pub mod truncate;

pub use dirs::{AppDirs, get_app_dirs, get_gasoline_home};
pub use http_client::{
    DEFAULT_TIMEOUT, HEALTH_CHECK_TIMEOUT, USER_AGENT, create_client_with_timeout,
    create_default_client, create_health_check_client,
};
pub use truncate::{SNIPPET_MAX_CHARS, snippet};
