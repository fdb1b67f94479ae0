//! Arena - Judged-Contest Orchestration for Independent Agents
//!
//! Arena drives structured, judged contests ("battles") between
//! independently hosted HTTP agents: it registers agents, resets
//! participants to a known-clean state, delivers the task to the judging
//! ("green") agent, enforces deadlines, records results, and broadcasts
//! live state to subscribers.
//!
//! # Architecture
//!
//! - `model` - Agent and Battle records, lifecycle state machine
//! - `registry` - agent registration and validation
//! - `launcher` - lifecycle control protocol client (reset/start/stop/health)
//! - `locks` - per-agent battle locks (one battle window per agent)
//! - `scheduler` - battle admission and the per-battle state machine
//! - `dispatch` - task delivery to green agents with hard deadlines
//! - `events` - snapshot/delta broadcasting to live subscribers
//! - `storage` - persistence gateway trait and in-memory implementation
//! - `api` - REST management surface and WebSocket live-update stream
//! - `config` - TOML configuration

#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod launcher;
pub mod locks;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod storage;

pub use config::ArenaConfig;
pub use error::{ArenaError, Result};
pub use model::{Agent, AgentId, Battle, BattleId, BattleState};
pub use registry::AgentRegistry;
pub use scheduler::BattleScheduler;

/// Arena version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
