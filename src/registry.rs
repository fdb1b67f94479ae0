//! Agent registry: validation and bookkeeping of registered agents.
//!
//! Registration is a purely local operation apart from one best-effort
//! descriptor probe. Agents are frequently down at registration time, so a
//! failed probe is logged and never blocks the registration itself.

use reqwest::Client as HttpClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ArenaError, Result};
use crate::model::{Agent, AgentCard, AgentId, ParticipantRequirement};
use crate::storage::PersistenceGateway;

/// Well-known path of the agent descriptor document
const AGENT_CARD_PATH: &str = "/agent.json";

/// Timeout for the best-effort descriptor probe
const CARD_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Registration request as submitted by a management client
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentSpec {
    /// Display name
    pub alias: String,
    /// Endpoint answering protocol messages
    pub agent_url: String,
    /// Endpoint controlling the agent's lifecycle
    pub launcher_url: String,
    /// Whether the agent can orchestrate and judge battles
    #[serde(default)]
    pub is_green: bool,
    /// Role tags the agent can fill as a participant
    #[serde(default)]
    pub roles: Vec<String>,
    /// Opponent slots a green agent needs; must be empty otherwise
    #[serde(default)]
    pub participant_requirements: Vec<ParticipantRequirement>,
}

/// Validates and stores agent metadata
pub struct AgentRegistry {
    store: Arc<dyn PersistenceGateway>,
    http: HttpClient,
}

impl AgentRegistry {
    /// Create a registry over the given gateway
    pub fn new(store: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            store,
            http: HttpClient::new(),
        }
    }

    /// Register a new agent.
    ///
    /// Rejects malformed URLs, identical task/launcher endpoints, duplicate
    /// `(agent_url, launcher_url)` pairs (enforced atomically by the
    /// gateway, so concurrent registrations of the same pair admit exactly
    /// one), participant requirements on non-green agents, and requirements
    /// with an empty role name. The descriptor probe runs after the record
    /// is stored and only warns on failure.
    pub async fn register(&self, spec: AgentSpec) -> Result<Agent> {
        let agent_url = normalize_endpoint(&spec.agent_url, "agent_url")?;
        let launcher_url = normalize_endpoint(&spec.launcher_url, "launcher_url")?;

        if agent_url == launcher_url {
            return Err(ArenaError::Validation(
                "agent_url and launcher_url must be distinct endpoints".to_string(),
            ));
        }

        if spec.alias.trim().is_empty() {
            return Err(ArenaError::Validation("alias must not be empty".to_string()));
        }

        if !spec.is_green && !spec.participant_requirements.is_empty() {
            return Err(ArenaError::Validation(
                "participant_requirements are only valid for green agents".to_string(),
            ));
        }

        for requirement in &spec.participant_requirements {
            if requirement.role.trim().is_empty() {
                return Err(ArenaError::Validation(format!(
                    "participant requirement '{}' has an empty role name",
                    requirement.name
                )));
            }
        }

        let agent = Agent {
            id: AgentId::new(),
            alias: spec.alias,
            agent_url,
            launcher_url,
            is_green: spec.is_green,
            roles: spec.roles,
            participant_requirements: spec.participant_requirements,
            registered_at: chrono::Utc::now(),
        };

        // Endpoint-pair uniqueness is checked inside the insert.
        self.store.insert_agent(agent.clone()).await?;
        info!(agent_id = %agent.id, alias = %agent.alias, is_green = agent.is_green, "Agent registered");

        // Best-effort descriptor validation; the agent may simply not be
        // up yet.
        match self.fetch_card(&agent.agent_url).await {
            Ok(card) => debug!(
                agent_id = %agent.id,
                card_name = %card.name,
                "Agent descriptor validated"
            ),
            Err(e) => warn!(
                agent_id = %agent.id,
                agent_url = %agent.agent_url,
                "Agent descriptor probe failed (registration stands): {}",
                e
            ),
        }

        Ok(agent)
    }

    /// Fetch an agent by id
    pub async fn get(&self, id: AgentId) -> Result<Agent> {
        self.store.get_agent(id).await
    }

    /// All registered agents
    pub async fn list(&self) -> Result<Vec<Agent>> {
        self.store.list_agents().await
    }

    /// Update an agent's alias, the only mutable field
    pub async fn update_alias(&self, id: AgentId, alias: String) -> Result<Agent> {
        if alias.trim().is_empty() {
            return Err(ArenaError::Validation("alias must not be empty".to_string()));
        }
        let mut agent = self.store.get_agent(id).await?;
        agent.alias = alias;
        self.store.save_agent(agent.clone()).await?;
        Ok(agent)
    }

    /// Remove an agent, unless an active battle still references it.
    /// The reference check and the delete are one atomic gateway step.
    pub async fn remove(&self, id: AgentId) -> Result<()> {
        self.store.remove_agent(id).await?;
        info!(agent_id = %id, "Agent removed");
        Ok(())
    }

    async fn fetch_card(&self, agent_url: &str) -> Result<AgentCard> {
        let url = format!("{}{}", agent_url, AGENT_CARD_PATH);
        let response = self
            .http
            .get(&url)
            .timeout(CARD_PROBE_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ArenaError::Protocol(format!(
                "descriptor request returned {}",
                response.status()
            )));
        }

        let card: AgentCard = response.json().await.map_err(|e| {
            ArenaError::Protocol(format!("malformed agent descriptor: {}", e))
        })?;
        Ok(card)
    }
}

/// Parse and normalize an endpoint URL, stripping any trailing slash so
/// duplicate detection is not defeated by formatting.
fn normalize_endpoint(raw: &str, field: &str) -> Result<String> {
    let parsed = Url::parse(raw)
        .map_err(|e| ArenaError::Validation(format!("{} is not a valid URL: {}", field, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ArenaError::Validation(format!(
            "{} must be an http(s) URL, got scheme '{}'",
            field,
            parsed.scheme()
        )));
    }

    if parsed.host_str().is_none() {
        return Err(ArenaError::Validation(format!("{} has no host", field)));
    }

    Ok(parsed.to_string().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Battle, BattleState, Opponent};
    use crate::storage::MemoryGateway;

    fn spec(alias: &str, agent_port: u16, launcher_port: u16) -> AgentSpec {
        AgentSpec {
            alias: alias.to_string(),
            agent_url: format!("http://127.0.0.1:{}", agent_port),
            launcher_url: format!("http://127.0.0.1:{}", launcher_port),
            is_green: false,
            roles: vec!["white".to_string()],
            participant_requirements: Vec::new(),
        }
    }

    #[tokio::test]
    async fn register_and_list() {
        let registry = AgentRegistry::new(MemoryGateway::shared());

        for i in 0..3u16 {
            registry
                .register(spec(&format!("agent-{}", i), 9100 + i * 2, 9101 + i * 2))
                .await
                .unwrap();
        }

        let agents = registry.list().await.unwrap();
        assert_eq!(agents.len(), 3);
        let mut ids: Vec<_> = agents.iter().map(|a| a.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn rejects_duplicate_endpoint_pair() {
        let registry = AgentRegistry::new(MemoryGateway::shared());

        registry.register(spec("one", 9200, 9201)).await.unwrap();
        let err = registry.register(spec("two", 9200, 9201)).await.unwrap_err();
        assert!(matches!(err, ArenaError::Validation(_)));
    }

    #[tokio::test]
    async fn concurrent_duplicate_registrations_admit_exactly_one() {
        let registry = Arc::new(AgentRegistry::new(MemoryGateway::shared()));

        let left = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.register(spec("left", 9900, 9901)).await })
        };
        let right = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.register(spec("right", 9900, 9901)).await })
        };

        let outcomes = [left.await.unwrap(), right.await.unwrap()];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(ArenaError::Validation(_)))));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_identical_endpoints() {
        let registry = AgentRegistry::new(MemoryGateway::shared());
        let err = registry.register(spec("same", 9300, 9300)).await.unwrap_err();
        assert!(matches!(err, ArenaError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_malformed_url() {
        let registry = AgentRegistry::new(MemoryGateway::shared());
        let mut bad = spec("bad", 9400, 9401);
        bad.agent_url = "not a url".to_string();
        let err = registry.register(bad).await.unwrap_err();
        assert!(matches!(err, ArenaError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_requirements_on_non_green() {
        let registry = AgentRegistry::new(MemoryGateway::shared());
        let mut bad = spec("bad", 9500, 9501);
        bad.participant_requirements = vec![ParticipantRequirement {
            role: "white".to_string(),
            name: "white player".to_string(),
            required: true,
        }];
        let err = registry.register(bad).await.unwrap_err();
        assert!(matches!(err, ArenaError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_empty_requirement_role() {
        let registry = AgentRegistry::new(MemoryGateway::shared());
        let mut bad = spec("bad", 9600, 9601);
        bad.is_green = true;
        bad.participant_requirements = vec![ParticipantRequirement {
            role: "  ".to_string(),
            name: "mystery".to_string(),
            required: true,
        }];
        let err = registry.register(bad).await.unwrap_err();
        assert!(matches!(err, ArenaError::Validation(_)));
    }

    #[tokio::test]
    async fn remove_rejected_while_battle_active() {
        let store = MemoryGateway::shared();
        let registry = AgentRegistry::new(store.clone());

        let agent = registry.register(spec("busy", 9700, 9701)).await.unwrap();
        let mut battle = Battle::new(
            AgentId::new(),
            vec![Opponent {
                agent_id: agent.id,
                role_name: "white".to_string(),
            }],
            30,
        );
        battle.state = BattleState::Running;
        store.save_battle(battle.clone()).await.unwrap();

        let err = registry.remove(agent.id).await.unwrap_err();
        assert!(matches!(err, ArenaError::Conflict(_)));

        // Terminal battles release the reference
        battle.state = BattleState::Finished;
        store.save_battle(battle).await.unwrap();
        registry.remove(agent.id).await.unwrap();
    }

    #[tokio::test]
    async fn alias_is_mutable() {
        let registry = AgentRegistry::new(MemoryGateway::shared());
        let agent = registry.register(spec("old-name", 9800, 9801)).await.unwrap();
        let updated = registry
            .update_alias(agent.id, "new-name".to_string())
            .await
            .unwrap();
        assert_eq!(updated.alias, "new-name");
    }
}
