//! Router assembly and HTTP listener.

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use super::{routes, websocket};
use crate::config::ArenaConfig;
use crate::dispatch::ProtocolDispatcher;
use crate::events::EventBroadcaster;
use crate::launcher::LauncherClient;
use crate::registry::AgentRegistry;
use crate::scheduler::BattleScheduler;
use crate::storage::MemoryGateway;

/// Wire up all components from configuration and build the full router.
///
/// Also returns the shared state so callers (tests, embedding binaries)
/// can reach the registry and scheduler directly.
pub fn build_router(config: &ArenaConfig) -> (Router, routes::AppState) {
    let store = MemoryGateway::shared();
    let broadcaster = EventBroadcaster::new(store.clone(), config.events.buffer);
    let registry = Arc::new(AgentRegistry::new(store.clone()));
    let scheduler = BattleScheduler::new(
        store,
        LauncherClient::new(config.launcher_config()),
        ProtocolDispatcher::new(),
        broadcaster.clone(),
        config.battle.default_timeout_seconds,
    );

    let state = routes::AppState {
        registry,
        scheduler,
        broadcaster: broadcaster.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    let api_routes = routes::create_routes(state.clone())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let ws_routes = websocket::websocket_routes(broadcaster);

    let app = Router::new()
        .nest("/api/v1", api_routes)
        .nest("/api/v1", ws_routes);

    (app, state)
}

/// Run the arena server (blocking)
pub async fn serve(config: ArenaConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let (app, _state) = build_router(&config);

    info!("Arena server starting");
    info!("  Listening: http://{}", addr);
    info!("  API:       http://{}/api/v1/", addr);
    info!("  WebSocket: ws://{}/api/v1/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
