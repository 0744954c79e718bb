//! Live browser work: the managed session and the page actions run on it.

pub mod act;
pub mod session;

pub use session::{
    RestartReason, RestartThresholds, SessionHandle, SessionHealth, SessionManager, SessionState,
    WarmUp,
};
