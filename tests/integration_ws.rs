//! Integration tests for the live-update WebSocket surface.
//!
//! A real WebSocket client connects to the served router and asserts the
//! wire framing: a `snapshot` message on connect, one `delta` message per
//! state transition, and `pong` replies to keepalive pings.

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use arena::api::AppState;
use arena::config::ArenaConfig;
use arena::model::ParticipantRequirement;
use arena::registry::AgentSpec;
use arena::scheduler::{BattleRequest, OpponentSlot};

use common::{spawn_agent, MockAgent, TaskBehavior};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server() -> (String, AppState) {
    let config = ArenaConfig::default();
    let (router, state) = arena::api::build_router(&config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("local addr");
    common::serve_in_background(listener, router);

    (format!("ws://{}/api/v1/ws", addr), state)
}

async fn connect(ws_url: &str) -> WsClient {
    let (client, _response) = connect_async(ws_url).await.expect("ws connect");
    client
}

/// Next text frame on the connection, parsed as JSON
async fn next_json(client: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("frame within deadline")
            .expect("connection still open")
            .expect("readable frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("json frame");
        }
    }
}

async fn register(state: &AppState, spec: AgentSpec) -> arena::model::AgentId {
    state.registry.register(spec).await.expect("register agent").id
}

fn green_spec(mock: &MockAgent) -> AgentSpec {
    AgentSpec {
        alias: "green".to_string(),
        agent_url: mock.agent_url.clone(),
        launcher_url: mock.launcher_url.clone(),
        is_green: true,
        roles: vec![],
        participant_requirements: vec![ParticipantRequirement {
            role: "white".to_string(),
            name: "white player".to_string(),
            required: true,
        }],
    }
}

fn white_spec(mock: &MockAgent) -> AgentSpec {
    AgentSpec {
        alias: "white".to_string(),
        agent_url: mock.agent_url.clone(),
        launcher_url: mock.launcher_url.clone(),
        is_green: false,
        roles: vec!["white".to_string()],
        participant_requirements: vec![],
    }
}

#[tokio::test]
async fn snapshot_on_connect_then_ordered_deltas() {
    let (ws_url, state) = spawn_server().await;

    let mut client = connect(&ws_url).await;
    let first = next_json(&mut client).await;
    assert_eq!(first["type"], "snapshot");
    assert_eq!(first["battles"].as_array().expect("battles array").len(), 0);

    let green_mock = spawn_agent(TaskBehavior::Winner("white".to_string())).await;
    let white_mock = spawn_agent(TaskBehavior::Winner("unused".to_string())).await;
    let green_id = register(&state, green_spec(&green_mock)).await;
    let white_id = register(&state, white_spec(&white_mock)).await;

    let battle = state
        .scheduler
        .submit(BattleRequest {
            green_agent_id: green_id,
            opponents: vec![OpponentSlot {
                agent_id: white_id,
                name: "white".to_string(),
            }],
            timeout_seconds: Some(10),
        })
        .await
        .expect("submit battle");

    let mut states = Vec::new();
    loop {
        let message = next_json(&mut client).await;
        assert_eq!(message["type"], "delta");
        assert_eq!(message["battle"]["id"], battle.id.to_string());

        let battle_state = message["battle"]["state"]
            .as_str()
            .expect("state field")
            .to_string();
        let terminal = battle_state == "finished" || battle_state == "error";
        states.push(battle_state);
        if terminal {
            assert_eq!(message["battle"]["result"]["winner"], "white");
            break;
        }
    }

    assert_eq!(states, vec!["pending", "queued", "running", "finished"]);
}

#[tokio::test]
async fn snapshot_reflects_battles_from_before_the_connection() {
    let (ws_url, state) = spawn_server().await;

    let green_mock = spawn_agent(TaskBehavior::Winner("white".to_string())).await;
    let white_mock = spawn_agent(TaskBehavior::Winner("unused".to_string())).await;
    let green_id = register(&state, green_spec(&green_mock)).await;
    let white_id = register(&state, white_spec(&white_mock)).await;

    let battle = state
        .scheduler
        .submit(BattleRequest {
            green_agent_id: green_id,
            opponents: vec![OpponentSlot {
                agent_id: white_id,
                name: "white".to_string(),
            }],
            timeout_seconds: Some(10),
        })
        .await
        .expect("submit battle");

    // Let the battle settle before anyone subscribes
    let mut finished = false;
    for _ in 0..100 {
        let current = state.scheduler.get(battle.id).await.expect("battle stored");
        if current.state.is_terminal() {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(finished, "battle should settle before the connection");

    let mut client = connect(&ws_url).await;
    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["type"], "snapshot");

    let battles = snapshot["battles"].as_array().expect("battles array");
    assert_eq!(battles.len(), 1);
    assert_eq!(battles[0]["id"], battle.id.to_string());
    assert_eq!(battles[0]["state"], "finished");
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let (ws_url, _state) = spawn_server().await;

    let mut client = connect(&ws_url).await;
    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["type"], "snapshot");

    client
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .expect("send ping");

    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "pong");
}
