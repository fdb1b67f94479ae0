//! REST management surface.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::events::EventBroadcaster;
use crate::model::{Agent, AgentId, Battle, BattleId};
use crate::registry::{AgentRegistry, AgentSpec};
use crate::scheduler::{BattleRequest, BattleScheduler};

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    /// Agent registration and lookup
    pub registry: Arc<AgentRegistry>,
    /// Battle admission and lifecycle
    pub scheduler: BattleScheduler,
    /// Live-update stream source
    pub broadcaster: EventBroadcaster,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" when the server answers
    pub status: String,
    /// Crate version
    pub version: String,
    /// Number of registered agents
    pub registered_agents: usize,
    /// Number of stored battles, terminal ones included
    pub battles: usize,
    /// Currently attached live-update subscribers
    pub subscribers: usize,
}

/// Alias update request; alias is the only mutable agent field
#[derive(Debug, Deserialize)]
pub struct UpdateAgentRequest {
    /// The new display name
    pub alias: String,
}

/// Create all management routes
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agents", get(list_agents).post(register_agent))
        .route(
            "/agents/{id}",
            get(get_agent).put(update_agent).delete(delete_agent),
        )
        .route("/battles", get(list_battles).post(create_battle))
        .route("/battles/{id}", get(get_battle))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let agents = state.registry.list().await?;
    let battles = state.scheduler.list().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        registered_agents: agents.len(),
        battles: battles.len(),
        subscribers: state.broadcaster.subscriber_count(),
    }))
}

/// List all registered agents
async fn list_agents(State(state): State<AppState>) -> Result<Json<Vec<Agent>>, ApiError> {
    Ok(Json(state.registry.list().await?))
}

/// Register a new agent
async fn register_agent(
    State(state): State<AppState>,
    Json(spec): Json<AgentSpec>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.registry.register(spec).await?))
}

/// Fetch one agent
async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<AgentId>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.registry.get(id).await?))
}

/// Update an agent's alias
async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<AgentId>,
    Json(request): Json<UpdateAgentRequest>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.registry.update_alias(id, request.alias).await?))
}

/// Remove an agent unless an active battle references it
async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<AgentId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.remove(id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// List all battles
async fn list_battles(State(state): State<AppState>) -> Result<Json<Vec<Battle>>, ApiError> {
    Ok(Json(state.scheduler.list().await?))
}

/// Submit a new battle
async fn create_battle(
    State(state): State<AppState>,
    Json(request): Json<BattleRequest>,
) -> Result<Json<Battle>, ApiError> {
    Ok(Json(state.scheduler.submit(request).await?))
}

/// Fetch one battle
async fn get_battle(
    State(state): State<AppState>,
    Path(id): Path<BattleId>,
) -> Result<Json<Battle>, ApiError> {
    Ok(Json(state.scheduler.get(id).await?))
}
