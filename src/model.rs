//! Core data model for agents and battles.
//!
//! Records here are the persisted shapes: `Agent` as registered, `Battle`
//! as driven through its lifecycle by the scheduler. Payloads exchanged
//! with agents over the wire live in [`crate::dispatch`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a registered agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Generate a fresh agent id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AgentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BattleId(Uuid);

impl BattleId {
    /// Generate a fresh battle id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BattleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BattleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BattleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ============================================================================
// Agent
// ============================================================================

/// One opponent role a green agent needs filled before it can run a battle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRequirement {
    /// Role tag the opponent must carry (e.g. "white")
    pub role: String,

    /// Human-readable name for the slot
    pub name: String,

    /// Whether a battle may start without this slot filled
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// A registered agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique id, assigned at registration
    pub id: AgentId,

    /// Display name; the only mutable field after registration
    pub alias: String,

    /// Endpoint answering protocol (task) messages
    pub agent_url: String,

    /// Endpoint controlling the agent's lifecycle (reset/start/stop/health)
    pub launcher_url: String,

    /// Whether this agent can orchestrate and judge battles
    pub is_green: bool,

    /// Role tags this agent can fill as a participant
    #[serde(default)]
    pub roles: Vec<String>,

    /// Opponent slots a green agent needs; always empty for non-green agents
    #[serde(default)]
    pub participant_requirements: Vec<ParticipantRequirement>,

    /// Registration timestamp
    pub registered_at: DateTime<Utc>,
}

/// Descriptor document an agent publishes at its well-known path.
///
/// Fetched best-effort at registration time; absence or malformed content
/// is logged, never fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCard {
    /// Self-reported agent name
    #[serde(default)]
    pub name: String,
    /// Capability tags
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Skill tags
    #[serde(default)]
    pub skills: Vec<String>,
}

// ============================================================================
// Battle
// ============================================================================

/// Battle lifecycle state.
///
/// `Pending` and the two terminal states are resting states; `Queued` and
/// `Running` are transient. Transitions only follow
/// `pending → queued → running → {finished | error}`, with `queued → error`
/// allowed when pre-battle setup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleState {
    /// Created and validated, lifecycle task not yet started
    Pending,
    /// Participants being claimed, reset and health-checked
    Queued,
    /// Task dispatched to the green agent
    Running,
    /// Green agent returned a validated result
    Finished,
    /// Setup failed, dispatch failed, or the deadline elapsed
    Error,
}

impl BattleState {
    /// Whether a battle in this state can still change
    pub fn is_terminal(&self) -> bool {
        matches!(self, BattleState::Finished | BattleState::Error)
    }

    /// Whether the edge `self → next` exists in the lifecycle
    pub fn can_transition_to(&self, next: BattleState) -> bool {
        matches!(
            (self, next),
            (BattleState::Pending, BattleState::Queued)
                | (BattleState::Queued, BattleState::Running)
                | (BattleState::Queued, BattleState::Error)
                | (BattleState::Running, BattleState::Finished)
                | (BattleState::Running, BattleState::Error)
        )
    }
}

impl fmt::Display for BattleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BattleState::Pending => "pending",
            BattleState::Queued => "queued",
            BattleState::Running => "running",
            BattleState::Finished => "finished",
            BattleState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One opponent slot assignment in a battle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opponent {
    /// The registered agent filling the slot
    pub agent_id: AgentId,

    /// Role name matching one of the green agent's requirements
    pub role_name: String,
}

/// Terminal result reported by the green agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleResult {
    /// An opponent role name, `"draw"`, or absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,

    /// Domain-specific score, opaque to the orchestrator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<serde_json::Value>,

    /// When the green agent finished judging
    pub finish_time: DateTime<Utc>,

    /// Any extra fields the green agent reported
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub detail: HashMap<String, serde_json::Value>,
}

/// A judged contest between one green agent and its opponents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Battle {
    /// Unique id, assigned at submission
    pub id: BattleId,

    /// The orchestrating/judging agent
    pub green_agent_id: AgentId,

    /// Opponent slot assignments, in submission order
    pub opponents: Vec<Opponent>,

    /// Current lifecycle state; written only by the scheduler
    pub state: BattleState,

    /// Submission timestamp
    pub created_at: DateTime<Utc>,

    /// Populated on `finished`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BattleResult>,

    /// Human-readable failure description, populated on `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Hard deadline for the task dispatch call
    pub timeout_seconds: u64,
}

impl Battle {
    /// Create a battle in the `pending` state
    pub fn new(green_agent_id: AgentId, opponents: Vec<Opponent>, timeout_seconds: u64) -> Self {
        Self {
            id: BattleId::new(),
            green_agent_id,
            opponents,
            state: BattleState::Pending,
            created_at: Utc::now(),
            result: None,
            error: None,
            timeout_seconds,
        }
    }

    /// All agents taking part in this battle, green agent first
    pub fn participant_ids(&self) -> Vec<AgentId> {
        let mut ids = Vec::with_capacity(1 + self.opponents.len());
        ids.push(self.green_agent_id);
        for opponent in &self.opponents {
            if !ids.contains(&opponent.agent_id) {
                ids.push(opponent.agent_id);
            }
        }
        ids
    }
}
