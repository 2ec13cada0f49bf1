//! HTTP surface for the media relay
//!
//! - GET /stream - WebSocket upgrade carrying one media stream
//! - GET /sessions - Statistics for connected sessions
//! - GET /health - Health check

mod handlers;
mod routes;
pub mod socket;
mod state;

pub use routes::create_router;
pub use state::AppState;
