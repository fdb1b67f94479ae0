//! Management and live-update surfaces.
//!
//! - `routes` - REST management surface (agents, battles, health)
//! - `websocket` - live-update stream (snapshot on connect, deltas after)
//! - `server` - router assembly and listener
//! - `error` - HTTP mapping of the orchestrator error taxonomy

pub mod error;
pub mod routes;
pub mod server;
pub mod websocket;

pub use error::ApiError;
pub use routes::AppState;
pub use server::{build_router, serve};
