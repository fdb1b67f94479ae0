//! Lifecycle control client for agent launchers.
//!
//! Each agent exposes a launcher endpoint, separate from its task endpoint,
//! answering `reset`, `start`, `stop` and `health` control calls. This
//! client drives agents to a known-reset state before a battle and probes
//! liveness before admission. Transport failures are retried with bounded
//! exponential backoff; a launcher that answers and refuses is not retried.

use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{ArenaError, Result};
use crate::model::Agent;

/// Result of a liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The launcher answered the probe successfully
    Healthy,
    /// The launcher was unreachable or answered with a failure
    Unhealthy,
}

/// Launcher control reply body. Launchers may answer with an empty body;
/// every field is optional.
#[derive(Debug, Default, Deserialize)]
struct ControlReply {
    #[serde(default)]
    message: Option<String>,
}

/// Retry and timeout settings for launcher control calls
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Maximum attempts per control call (first try included)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry
    pub base_delay: Duration,
    /// Per-attempt timeout
    pub call_timeout: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Client for the agent-lifecycle control protocol
#[derive(Clone)]
pub struct LauncherClient {
    http: HttpClient,
    config: LauncherConfig,
}

impl LauncherClient {
    /// Create a client with the given retry policy
    pub fn new(config: LauncherConfig) -> Self {
        Self {
            http: HttpClient::new(),
            config,
        }
    }

    /// Drive the agent to a known-clean state
    pub async fn reset(&self, agent: &Agent) -> Result<()> {
        self.control_with_retry(agent, "reset").await
    }

    /// Ask the launcher to start the agent process
    pub async fn start(&self, agent: &Agent) -> Result<()> {
        self.control_with_retry(agent, "start").await
    }

    /// Ask the launcher to stop the agent process
    pub async fn stop(&self, agent: &Agent) -> Result<()> {
        self.control_with_retry(agent, "stop").await
    }

    /// Lightweight liveness probe; a single attempt, no retries
    pub async fn health(&self, agent: &Agent) -> HealthStatus {
        let url = format!("{}/health", agent.launcher_url);
        let result = self
            .http
            .get(&url)
            .timeout(self.config.call_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) => {
                warn!(agent_id = %agent.id, status = %response.status(), "Health probe failed");
                HealthStatus::Unhealthy
            }
            Err(e) => {
                warn!(agent_id = %agent.id, "Health probe unreachable: {}", e);
                HealthStatus::Unhealthy
            }
        }
    }

    /// Issue one control operation with bounded retry and exponential
    /// backoff. Only transport-level failures are retried; a rejection
    /// from a reachable launcher surfaces immediately.
    async fn control_with_retry(&self, agent: &Agent, operation: &str) -> Result<()> {
        let mut attempt = 0u32;
        let mut delay = self.config.base_delay;

        loop {
            match self.control_once(agent, operation).await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(
                            agent_id = %agent.id,
                            operation,
                            "Control call succeeded after {} retries",
                            attempt
                        );
                    }
                    return Ok(());
                }
                Err(e) if attempt + 1 < self.config.max_attempts && e.is_retryable() => {
                    warn!(
                        agent_id = %agent.id,
                        operation,
                        "Control call failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.config.max_attempts,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    error!(agent_id = %agent.id, operation, "Control call failed permanently: {}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn control_once(&self, agent: &Agent, operation: &str) -> Result<()> {
        let url = format!("{}/{}", agent.launcher_url, operation);
        debug!(agent_id = %agent.id, "POST {}", url);

        let response = self
            .http
            .post(&url)
            .timeout(self.config.call_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ArenaError::LauncherUnreachable(format!(
                        "launcher {} did not answer {}: {}",
                        agent.launcher_url, operation, e
                    ))
                } else {
                    ArenaError::Network(e.to_string())
                }
            })?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let reply: ControlReply = response.json().await.unwrap_or_default();
        let detail = reply.message.unwrap_or_else(|| status.to_string());

        match operation {
            "reset" => Err(ArenaError::ResetRejected(format!(
                "launcher {} rejected reset: {}",
                agent.launcher_url, detail
            ))),
            _ => Err(ArenaError::Protocol(format!(
                "launcher {} rejected {}: {}",
                agent.launcher_url, operation, detail
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgentId;

    fn unreachable_agent() -> Agent {
        Agent {
            id: AgentId::new(),
            alias: "ghost".to_string(),
            // Reserved port on localhost, nothing listens here
            agent_url: "http://127.0.0.1:1".to_string(),
            launcher_url: "http://127.0.0.1:1".to_string(),
            is_green: false,
            roles: Vec::new(),
            participant_requirements: Vec::new(),
            registered_at: chrono::Utc::now(),
        }
    }

    fn fast_config() -> LauncherConfig {
        LauncherConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            call_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn reset_of_unreachable_launcher_is_typed() {
        let client = LauncherClient::new(fast_config());
        let err = client.reset(&unreachable_agent()).await.unwrap_err();
        assert!(matches!(err, ArenaError::LauncherUnreachable(_)));
    }

    #[tokio::test]
    async fn health_of_unreachable_launcher_is_unhealthy() {
        let client = LauncherClient::new(fast_config());
        let status = client.health(&unreachable_agent()).await;
        assert_eq!(status, HealthStatus::Unhealthy);
    }
}
