//! Durable record storage behind the `PersistenceGateway` trait.
//!
//! The contract is read-your-writes with respect to the scheduler's own
//! subsequent reads, plus safe concurrent access to independent battle
//! records. Cross-record checks (endpoint uniqueness, delete-while-
//! referenced) are part of the gateway so check and write are one atomic
//! step. The shipped [`MemoryGateway`] satisfies it with in-process maps;
//! durable backends plug in behind the same trait.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{ArenaError, Result};
use crate::model::{Agent, AgentId, Battle, BattleId};

/// Durable read/write of Agent and Battle records
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Insert a new agent record. The `(agent_url, launcher_url)` pair
    /// must be unique among stored agents; the uniqueness check and the
    /// insert happen atomically, so two concurrent inserts of the same
    /// pair cannot both succeed.
    async fn insert_agent(&self, agent: Agent) -> Result<()>;

    /// Insert or replace an agent record, without uniqueness checks
    async fn save_agent(&self, agent: Agent) -> Result<()>;

    /// Fetch an agent by id
    async fn get_agent(&self, id: AgentId) -> Result<Agent>;

    /// All registered agents, in registration order
    async fn list_agents(&self) -> Result<Vec<Agent>>;

    /// Remove an agent record. Rejected with `Conflict` while any
    /// non-terminal battle references the agent; the reference check and
    /// the delete happen atomically.
    async fn remove_agent(&self, id: AgentId) -> Result<()>;

    /// Insert a new battle record. Every participant must be a currently
    /// registered agent, checked atomically with the insert, so a battle
    /// can never be stored referencing an already-deleted agent.
    async fn insert_battle(&self, battle: Battle) -> Result<()>;

    /// Insert or replace a battle record
    async fn save_battle(&self, battle: Battle) -> Result<()>;

    /// Fetch a battle by id
    async fn get_battle(&self, id: BattleId) -> Result<Battle>;

    /// All battles, in creation order
    async fn list_battles(&self) -> Result<Vec<Battle>>;
}

#[derive(Default)]
struct StoreState {
    agents: HashMap<AgentId, Agent>,
    agent_order: Vec<AgentId>,
    battles: HashMap<BattleId, Battle>,
    battle_order: Vec<BattleId>,
}

/// In-memory gateway backed by one `RwLock` over both record families.
///
/// Writes take the lock exclusively, so a `save_battle` is visible to any
/// later `get_battle` from any task, and the cross-record operations
/// (`insert_agent`, `insert_battle`, `remove_agent`) observe a consistent
/// view of agents and battles together.
#[derive(Default)]
pub struct MemoryGateway {
    state: RwLock<StoreState>,
}

impl MemoryGateway {
    /// Create an empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor returning the trait-object form the rest of
    /// the system consumes
    pub fn shared() -> Arc<dyn PersistenceGateway> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn insert_agent(&self, agent: Agent) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .agents
            .values()
            .find(|a| a.agent_url == agent.agent_url && a.launcher_url == agent.launcher_url)
        {
            return Err(ArenaError::Validation(format!(
                "agent with endpoints ({}, {}) already registered as {}",
                agent.agent_url, agent.launcher_url, existing.id
            )));
        }
        state.agent_order.push(agent.id);
        state.agents.insert(agent.id, agent);
        Ok(())
    }

    async fn save_agent(&self, agent: Agent) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.agents.contains_key(&agent.id) {
            state.agent_order.push(agent.id);
        }
        state.agents.insert(agent.id, agent);
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> Result<Agent> {
        self.state
            .read()
            .await
            .agents
            .get(&id)
            .cloned()
            .ok_or_else(|| ArenaError::NotFound(format!("agent {}", id)))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let state = self.state.read().await;
        Ok(state
            .agent_order
            .iter()
            .filter_map(|id| state.agents.get(id).cloned())
            .collect())
    }

    async fn remove_agent(&self, id: AgentId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.agents.contains_key(&id) {
            return Err(ArenaError::NotFound(format!("agent {}", id)));
        }

        for battle in state.battles.values() {
            if battle.state.is_terminal() {
                continue;
            }
            if battle.green_agent_id == id || battle.opponents.iter().any(|o| o.agent_id == id) {
                return Err(ArenaError::Conflict(format!(
                    "agent {} is referenced by active battle {}",
                    id, battle.id
                )));
            }
        }

        state.agents.remove(&id);
        state.agent_order.retain(|a| *a != id);
        Ok(())
    }

    async fn insert_battle(&self, battle: Battle) -> Result<()> {
        let mut state = self.state.write().await;
        for id in battle.participant_ids() {
            if !state.agents.contains_key(&id) {
                return Err(ArenaError::NotFound(format!("agent {}", id)));
            }
        }
        state.battle_order.push(battle.id);
        state.battles.insert(battle.id, battle);
        Ok(())
    }

    async fn save_battle(&self, battle: Battle) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.battles.contains_key(&battle.id) {
            state.battle_order.push(battle.id);
        }
        state.battles.insert(battle.id, battle);
        Ok(())
    }

    async fn get_battle(&self, id: BattleId) -> Result<Battle> {
        self.state
            .read()
            .await
            .battles
            .get(&id)
            .cloned()
            .ok_or_else(|| ArenaError::NotFound(format!("battle {}", id)))
    }

    async fn list_battles(&self) -> Result<Vec<Battle>> {
        let state = self.state.read().await;
        Ok(state
            .battle_order
            .iter()
            .filter_map(|id| state.battles.get(id).cloned())
            .collect())
    }
}
