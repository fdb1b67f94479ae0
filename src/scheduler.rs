//! Battle scheduler: admission, requirement matching, and the per-battle
//! state machine.
//!
//! Each admitted battle runs as its own tokio task, so battles proceed
//! fully independently; within one battle the task applies transitions
//! sequentially, making the scheduler the sole writer of `Battle.state`.
//! Participant locks are acquired before resets and held until the battle
//! reaches a terminal state, then released by guard drop on every exit
//! path.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::dispatch::{OpponentEndpoint, ProtocolDispatcher, TaskOutcome};
use crate::error::{ArenaError, Result};
use crate::events::EventBroadcaster;
use crate::launcher::{HealthStatus, LauncherClient};
use crate::locks::AgentLockSet;
use crate::model::{Agent, AgentId, Battle, BattleResult, BattleState, Opponent};
use crate::storage::PersistenceGateway;

/// Battle submission as received from a management client
#[derive(Debug, Clone, Deserialize)]
pub struct BattleRequest {
    /// The orchestrating/judging agent
    pub green_agent_id: AgentId,
    /// Opponent slot assignments
    #[serde(default)]
    pub opponents: Vec<OpponentSlot>,
    /// Dispatch deadline; the configured default applies when absent
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// One opponent slot assignment in a submission
#[derive(Debug, Clone, Deserialize)]
pub struct OpponentSlot {
    /// The registered agent filling the slot
    pub agent_id: AgentId,
    /// Role name matching one of the green agent's requirements
    #[serde(alias = "role_name")]
    pub name: String,
}

/// Owns the battle lifecycle end to end.
///
/// Cheap to clone; clones share the store, lock set and broadcaster, so a
/// clone handed to a spawned task drives the same system.
#[derive(Clone)]
pub struct BattleScheduler {
    store: Arc<dyn PersistenceGateway>,
    launcher: LauncherClient,
    dispatcher: ProtocolDispatcher,
    broadcaster: EventBroadcaster,
    locks: AgentLockSet,
    default_timeout_seconds: u64,
}

impl BattleScheduler {
    /// Create a scheduler over the given collaborators
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        launcher: LauncherClient,
        dispatcher: ProtocolDispatcher,
        broadcaster: EventBroadcaster,
        default_timeout_seconds: u64,
    ) -> Self {
        Self {
            store,
            launcher,
            dispatcher,
            broadcaster,
            locks: AgentLockSet::new(),
            default_timeout_seconds,
        }
    }

    /// Submit a battle.
    ///
    /// Requirement matching is validated synchronously; a submission with
    /// an unmet required role is rejected here and never persisted. On
    /// success the battle is stored in `pending` and its lifecycle task is
    /// spawned.
    pub async fn submit(&self, request: BattleRequest) -> Result<Battle> {
        let green = self
            .store
            .get_agent(request.green_agent_id)
            .await
            .map_err(|_| {
                ArenaError::Validation(format!(
                    "green agent {} is not registered",
                    request.green_agent_id
                ))
            })?;

        if !green.is_green {
            return Err(ArenaError::Validation(format!(
                "agent {} cannot orchestrate battles",
                green.id
            )));
        }

        let opponents = self.match_requirements(&green, &request.opponents).await?;

        let timeout = request
            .timeout_seconds
            .unwrap_or(self.default_timeout_seconds);
        if timeout == 0 {
            return Err(ArenaError::Validation(
                "timeout_seconds must be positive".to_string(),
            ));
        }

        let battle = Battle::new(green.id, opponents, timeout);
        // The insert re-checks participant existence atomically, closing
        // the window where an agent is removed between validation and
        // persistence.
        self.store
            .insert_battle(battle.clone())
            .await
            .map_err(|e| match e {
                ArenaError::NotFound(what) => {
                    ArenaError::Validation(format!("{} was removed during submission", what))
                }
                other => other,
            })?;
        self.broadcaster.publish(battle.clone());
        info!(battle_id = %battle.id, green_agent = %green.id, "Battle submitted");

        let scheduler = self.clone();
        let spawned = battle.clone();
        tokio::spawn(async move {
            scheduler.run(spawned).await;
        });

        Ok(battle)
    }

    /// Fetch a battle by id
    pub async fn get(&self, id: crate::model::BattleId) -> Result<Battle> {
        self.store.get_battle(id).await
    }

    /// All battles in submission order
    pub async fn list(&self) -> Result<Vec<Battle>> {
        self.store.list_battles().await
    }

    /// Validate opponent slots against the green agent's requirements.
    ///
    /// Every `required` requirement must be filled by exactly one slot, no
    /// requirement by more than one, and no slot may name an unknown role.
    /// Each opponent agent must exist and carry the role it is filling.
    async fn match_requirements(
        &self,
        green: &Agent,
        slots: &[OpponentSlot],
    ) -> Result<Vec<Opponent>> {
        let mut fill_counts: HashMap<&str, usize> = HashMap::new();
        let mut opponents = Vec::with_capacity(slots.len());

        for slot in slots {
            let requirement = green
                .participant_requirements
                .iter()
                .find(|r| r.role == slot.name)
                .ok_or_else(|| {
                    ArenaError::Validation(format!(
                        "role '{}' is not among the green agent's requirements",
                        slot.name
                    ))
                })?;

            let agent = self.store.get_agent(slot.agent_id).await.map_err(|_| {
                ArenaError::Validation(format!("opponent agent {} is not registered", slot.agent_id))
            })?;

            if !agent.roles.iter().any(|r| r == &requirement.role) {
                return Err(ArenaError::Validation(format!(
                    "agent {} does not offer role '{}'",
                    agent.id, requirement.role
                )));
            }

            *fill_counts.entry(requirement.role.as_str()).or_insert(0) += 1;
            opponents.push(Opponent {
                agent_id: agent.id,
                role_name: slot.name.clone(),
            });
        }

        for requirement in &green.participant_requirements {
            let filled = fill_counts.get(requirement.role.as_str()).copied().unwrap_or(0);
            if requirement.required && filled == 0 {
                return Err(ArenaError::Validation(format!(
                    "required role '{}' has no opponent assigned",
                    requirement.role
                )));
            }
            if filled > 1 {
                return Err(ArenaError::Validation(format!(
                    "role '{}' is assigned {} times, expected at most one",
                    requirement.role, filled
                )));
            }
        }

        Ok(opponents)
    }

    /// Drive one battle through its lifecycle. Runs inside the battle's
    /// own task; never panics the runtime, every failure lands in the
    /// battle's `error` field.
    async fn run(&self, mut battle: Battle) {
        if let Err(e) = self.transition(&mut battle, BattleState::Queued).await {
            error!(battle_id = %battle.id, "Failed to queue battle: {}", e);
            return;
        }

        // Claim every participant before touching any launcher; guards are
        // held for the whole battle window and released when this scope
        // ends, whatever the outcome.
        let participants = battle.participant_ids();
        let _guards = self.locks.acquire_all(&participants).await;

        let agents = match self.load_participants(&participants).await {
            Ok(agents) => agents,
            Err(e) => {
                self.fail(&mut battle, format!("participant lookup failed: {}", e))
                    .await;
                return;
            }
        };

        if let Err(e) = self.prepare_participants(&battle, &agents).await {
            self.fail(&mut battle, e.to_string()).await;
            return;
        }

        if let Err(e) = self.transition(&mut battle, BattleState::Running).await {
            error!(battle_id = %battle.id, "Failed to start battle: {}", e);
            return;
        }

        let green = &agents[0];
        let endpoints = self.opponent_endpoints(green, &battle, &agents);

        match self.dispatcher.dispatch(&battle, green, endpoints).await {
            Ok(TaskOutcome::Ok {
                winner,
                score,
                detail,
            }) => {
                battle.result = Some(BattleResult {
                    winner,
                    score,
                    finish_time: chrono::Utc::now(),
                    detail,
                });
                if let Err(e) = self.transition(&mut battle, BattleState::Finished).await {
                    error!(battle_id = %battle.id, "Failed to record result: {}", e);
                }
            }
            Ok(TaskOutcome::Failure { message, .. }) => {
                self.fail(&mut battle, format!("green agent reported failure: {}", message))
                    .await;
            }
            Err(e) => {
                self.fail(&mut battle, e.to_string()).await;
            }
        }
    }

    async fn load_participants(&self, ids: &[AgentId]) -> Result<Vec<Agent>> {
        let mut agents = Vec::with_capacity(ids.len());
        for id in ids {
            agents.push(self.store.get_agent(*id).await?);
        }
        Ok(agents)
    }

    /// Reset all participants concurrently, then probe their health.
    /// Any failure aborts the battle before it runs; no partial battles.
    async fn prepare_participants(&self, battle: &Battle, agents: &[Agent]) -> Result<()> {
        let resets = agents.iter().map(|agent| self.launcher.reset(agent));
        futures::future::try_join_all(resets).await?;

        let probes = agents.iter().map(|agent| async move {
            (agent.id, self.launcher.health(agent).await)
        });
        for (agent_id, status) in futures::future::join_all(probes).await {
            if status == HealthStatus::Unhealthy {
                return Err(ArenaError::LauncherUnreachable(format!(
                    "agent {} failed its pre-battle health check",
                    agent_id
                )));
            }
        }

        info!(battle_id = %battle.id, participants = agents.len(), "All participants reset and healthy");
        Ok(())
    }

    /// Describe each opponent to the green agent: slot name, role label
    /// and the endpoint to call, so no further registry involvement is
    /// needed during the battle.
    fn opponent_endpoints(
        &self,
        green: &Agent,
        battle: &Battle,
        agents: &[Agent],
    ) -> Vec<OpponentEndpoint> {
        let urls: HashMap<AgentId, &str> = agents
            .iter()
            .map(|a| (a.id, a.agent_url.as_str()))
            .collect();

        battle
            .opponents
            .iter()
            .filter_map(|opponent| {
                let agent_url = urls.get(&opponent.agent_id)?;
                let slot_name = green
                    .participant_requirements
                    .iter()
                    .find(|r| r.role == opponent.role_name)
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| opponent.role_name.clone());
                Some(OpponentEndpoint {
                    name: slot_name,
                    role: opponent.role_name.clone(),
                    agent_url: agent_url.to_string(),
                })
            })
            .collect()
    }

    /// Apply one state-machine edge: validate, persist, then broadcast.
    /// Storage failure leaves the in-memory state unchanged so the edge
    /// can be retried.
    async fn transition(&self, battle: &mut Battle, next: BattleState) -> Result<()> {
        if !battle.state.can_transition_to(next) {
            return Err(ArenaError::Conflict(format!(
                "illegal battle transition {} -> {}",
                battle.state, next
            )));
        }

        let previous = battle.state;
        let mut updated = battle.clone();
        updated.state = next;
        self.store.save_battle(updated.clone()).await?;
        *battle = updated;

        info!(battle_id = %battle.id, "Battle {} -> {}", previous, next);
        self.broadcaster.publish(battle.clone());
        Ok(())
    }

    /// Record a terminal failure with a human-readable message.
    async fn fail(&self, battle: &mut Battle, message: String) {
        warn!(battle_id = %battle.id, "Battle failed: {}", message);
        battle.error = Some(message);

        let next = BattleState::Error;
        if let Err(e) = self.transition(battle, next).await {
            // Last resort: the record must not be left transient.
            error!(battle_id = %battle.id, "Failed to persist error state: {}", e);
        }
    }
}
