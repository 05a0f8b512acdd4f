//! Fix verification sessions.
//!
//! A session freezes a baseline of the page's current errors, watches
//! while the developer applies a fix, then freezes an "after" snapshot
//! and diffs the two. Matching is by normalised message for console
//! errors and by `"METHOD path"` for network errors, so volatile IDs and
//! timestamps do not defeat the comparison.

pub mod diff;
pub mod normalize;
pub mod session;

pub use diff::{NetworkErrorKey, PerfDiff, VerifyDiff, VerifySnapshot, compute_diff};
pub use normalize::normalize;
pub use session::{
    SessionStatus, VerificationSession, VerifyError, VerifyManager, MAX_SESSIONS, SESSION_TTL,
};
