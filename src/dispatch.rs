//! Protocol dispatcher: the single task call to a battle's green agent.
//!
//! The orchestrator sends one structured task message carrying the
//! opponents' endpoint URLs and role labels; the green agent contacts
//! opponents directly and answers with a structured outcome. The call has
//! a hard deadline equal to the battle's `timeout_seconds` and is never
//! retried, so a battle cannot silently run twice.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ArenaError, Result};
use crate::model::{Agent, Battle, BattleId};

/// Path on the green agent's task endpoint accepting battle tasks
const TASK_PATH: &str = "/task";

/// One opponent as described to the green agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpponentEndpoint {
    /// Slot name from the green agent's requirements
    pub name: String,
    /// Role label the opponent fills
    pub role: String,
    /// Where the green agent can reach the opponent
    pub agent_url: String,
}

/// Task message delivered to the green agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    /// The battle this task belongs to
    pub battle_id: BattleId,
    /// Opponents the green agent should contact, with their endpoints
    pub opponents: Vec<OpponentEndpoint>,
    /// Deadline the orchestrator enforces on this exchange
    pub timeout_seconds: u64,
}

/// Outcome reported by the green agent.
///
/// Tagged by a required discriminant; any domain-specific fields ride in
/// the flattened extension bag and are stored verbatim, never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The battle ran to completion and was judged
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<serde_json::Value>,
        #[serde(flatten)]
        detail: HashMap<String, serde_json::Value>,
    },
    /// The green agent reports it could not run or judge the battle
    Failure {
        #[serde(default)]
        message: String,
        #[serde(flatten)]
        detail: HashMap<String, serde_json::Value>,
    },
}

/// Sends task messages to green agents and validates their replies
#[derive(Clone)]
pub struct ProtocolDispatcher {
    http: reqwest::Client,
}

impl ProtocolDispatcher {
    /// Create a dispatcher
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Deliver the battle task to the green agent and wait for its outcome.
    ///
    /// The whole exchange is bounded by the battle's `timeout_seconds`; on
    /// expiry the in-flight call is dropped and `Timeout` is returned.
    pub async fn dispatch(
        &self,
        battle: &Battle,
        green: &Agent,
        opponents: Vec<OpponentEndpoint>,
    ) -> Result<TaskOutcome> {
        let payload = TaskPayload {
            battle_id: battle.id,
            opponents,
            timeout_seconds: battle.timeout_seconds,
        };

        let url = format!("{}{}", green.agent_url, TASK_PATH);
        let deadline = Duration::from_secs(battle.timeout_seconds);
        info!(battle_id = %battle.id, green_agent = %green.id, "Dispatching task to {}", url);

        // One deadline covers the request and the body read; expiry drops
        // the in-flight call.
        let exchange = async {
            let response = self
                .http
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() {
                        ArenaError::Protocol(format!("green agent unreachable: {}", e))
                    } else {
                        ArenaError::Network(e.to_string())
                    }
                })?;

            if !response.status().is_success() {
                return Err(ArenaError::Protocol(format!(
                    "green agent answered {}",
                    response.status()
                )));
            }

            response
                .text()
                .await
                .map_err(|e| ArenaError::Network(e.to_string()))
        };

        let text = match tokio::time::timeout(deadline, exchange).await {
            Ok(exchanged) => exchanged?,
            Err(_) => {
                return Err(ArenaError::Timeout(format!(
                    "dispatch exceeded {}s deadline",
                    battle.timeout_seconds
                )))
            }
        };

        debug!(battle_id = %battle.id, "Green agent reply: {}", text);
        parse_outcome(&text)
    }
}

impl Default for ProtocolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a green-agent reply against the minimal structural contract:
/// a tagged `ok` outcome must carry a winner or a score; `failure` must be
/// explicit. Anything else is a protocol error, never a crash.
fn parse_outcome(body: &str) -> Result<TaskOutcome> {
    let outcome: TaskOutcome = serde_json::from_str(body)
        .map_err(|e| ArenaError::Protocol(format!("malformed result payload: {}", e)))?;

    if let TaskOutcome::Ok { winner, score, .. } = &outcome {
        if winner.is_none() && score.is_none() {
            return Err(ArenaError::Protocol(
                "result payload carries neither winner nor score".to_string(),
            ));
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_with_winner() {
        let outcome = parse_outcome(r#"{"status":"ok","winner":"white"}"#).unwrap();
        match outcome {
            TaskOutcome::Ok { winner, .. } => assert_eq!(winner.as_deref(), Some("white")),
            _ => panic!("expected ok outcome"),
        }
    }

    #[test]
    fn parses_ok_with_score_and_extension_fields() {
        let outcome = parse_outcome(
            r#"{"status":"ok","score":{"white":3,"black":1},"rounds":4,"log_url":"http://x"}"#,
        )
        .unwrap();
        match outcome {
            TaskOutcome::Ok { score, detail, .. } => {
                assert!(score.is_some());
                assert_eq!(detail.len(), 2);
                assert!(detail.contains_key("rounds"));
            }
            _ => panic!("expected ok outcome"),
        }
    }

    #[test]
    fn parses_explicit_failure() {
        let outcome =
            parse_outcome(r#"{"status":"failure","message":"opponent crashed"}"#).unwrap();
        assert!(matches!(outcome, TaskOutcome::Failure { .. }));
    }

    #[test]
    fn rejects_ok_without_winner_or_score() {
        let err = parse_outcome(r#"{"status":"ok"}"#).unwrap_err();
        assert!(matches!(err, ArenaError::Protocol(_)));
    }

    #[test]
    fn rejects_missing_discriminant() {
        let err = parse_outcome(r#"{"winner":"white"}"#).unwrap_err();
        assert!(matches!(err, ArenaError::Protocol(_)));
    }

    #[test]
    fn rejects_non_json_body() {
        let err = parse_outcome("<html>busy</html>").unwrap_err();
        assert!(matches!(err, ArenaError::Protocol(_)));
    }
}
