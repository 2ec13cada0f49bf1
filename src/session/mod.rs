//! Call session management
//!
//! This module provides the `CallSession` abstraction that manages:
//! - Stream and call identifiers learned from inbound events
//! - The inbound event state machine (Idle, Identified, Streaming, Closed)
//! - The single outbound pacer run per session
//! - Session statistics

mod config;
pub mod pacer;
mod session;
mod stats;

pub use config::SessionConfig;
pub use pacer::{Pacer, PacerHandle, PacerOutcome};
pub use session::{CallSession, Dispatch, SessionState};
pub use stats::SessionStats;
