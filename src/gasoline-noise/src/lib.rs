//! Noise classification for captured telemetry.
//!
//! A rule-based classifier separates signal from noise (extension
//! chatter, analytics beacons, dev-server HMR traffic) before telemetry
//! reaches an MCP client. Built-in rules ship with the daemon; users add
//! their own through `configure`, and a frequency-based detector proposes
//! new rules from the buffers.

pub mod detect;
pub mod filter;
pub mod rules;

pub use detect::NoiseProposal;
pub use filter::{NoiseFilter, RuleStats};
pub use rules::{MatchSpec, NoiseError, NoiseRule, RuleCategory, validate_user_pattern};
