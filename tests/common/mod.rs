//! Shared helpers: mock agents for integration tests.
//!
//! Each mock agent is two small axum apps on ephemeral ports, one for the
//! task endpoint and one for the launcher, mirroring the real contract of
//! distinct endpoints. Handlers record what they receive so tests can
//! assert on payloads and call timing.

// Not every test binary uses every helper.
#![allow(dead_code)]

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How the mock green agent answers its task call
#[derive(Clone)]
pub enum TaskBehavior {
    /// Answer immediately with a winner
    Winner(String),
    /// Answer after a delay with a winner
    DelayedWinner { delay: Duration, winner: String },
    /// Report an explicit failure
    Failure(String),
    /// Answer 200 with a body that is not a valid outcome
    Malformed,
    /// Never answer
    Hang,
}

/// Everything the mock observed
#[derive(Clone, Default)]
pub struct Recorded {
    pub resets: Arc<Mutex<Vec<Instant>>>,
    pub tasks: Arc<Mutex<Vec<serde_json::Value>>>,
    pub task_completions: Arc<Mutex<Vec<Instant>>>,
}

impl Recorded {
    pub fn reset_times(&self) -> Vec<Instant> {
        self.resets.lock().unwrap().clone()
    }

    pub fn task_payloads(&self) -> Vec<serde_json::Value> {
        self.tasks.lock().unwrap().clone()
    }
}

/// A running mock agent
pub struct MockAgent {
    pub agent_url: String,
    pub launcher_url: String,
    pub recorded: Recorded,
}

#[derive(Clone)]
struct MockState {
    behavior: TaskBehavior,
    recorded: Recorded,
}

/// Serve a router until the test process exits
pub fn serve_in_background(listener: tokio::net::TcpListener, router: Router) {
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
}

async fn bind() -> (tokio::net::TcpListener, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

/// A localhost port with nothing listening on it
pub async fn dead_endpoint() -> String {
    let (listener, addr) = bind().await;
    drop(listener);
    format!("http://{}", addr)
}

fn task_router(state: MockState) -> Router {
    Router::new()
        .route("/agent.json", get(agent_card))
        .route("/task", post(handle_task))
        .with_state(state)
}

fn launcher_router(state: MockState, reject_reset: bool) -> Router {
    let router = Router::new()
        .route("/start", post(control_ok))
        .route("/stop", post(control_ok))
        .route("/health", get(control_ok));

    if reject_reset {
        router.route("/reset", post(reject)).with_state(state)
    } else {
        router.route("/reset", post(handle_reset)).with_state(state)
    }
}

async fn agent_card() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "mock-agent",
        "capabilities": ["battle"],
        "skills": ["mock"]
    }))
}

async fn control_ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "ok" }))
}

async fn reject() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "message": "simulated reset refusal" })),
    )
}

async fn handle_reset(State(state): State<MockState>) -> Json<serde_json::Value> {
    state.recorded.resets.lock().unwrap().push(Instant::now());
    Json(serde_json::json!({ "message": "reset complete" }))
}

async fn handle_task(
    State(state): State<MockState>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.recorded.tasks.lock().unwrap().push(payload);

    let response = match &state.behavior {
        TaskBehavior::Winner(winner) => {
            serde_json::json!({ "status": "ok", "winner": winner }).to_string()
        }
        TaskBehavior::DelayedWinner { delay, winner } => {
            tokio::time::sleep(*delay).await;
            serde_json::json!({ "status": "ok", "winner": winner }).to_string()
        }
        TaskBehavior::Failure(message) => {
            serde_json::json!({ "status": "failure", "message": message }).to_string()
        }
        TaskBehavior::Malformed => "<html>definitely not an outcome</html>".to_string(),
        TaskBehavior::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            String::new()
        }
    };

    state
        .recorded
        .task_completions
        .lock()
        .unwrap()
        .push(Instant::now());

    (
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        response,
    )
}

/// Spawn a fully functional mock agent
pub async fn spawn_agent(behavior: TaskBehavior) -> MockAgent {
    let recorded = Recorded::default();
    let state = MockState {
        behavior,
        recorded: recorded.clone(),
    };

    let (task_listener, task_addr) = bind().await;
    let (launcher_listener, launcher_addr) = bind().await;

    serve_in_background(task_listener, task_router(state.clone()));
    serve_in_background(launcher_listener, launcher_router(state, false));

    MockAgent {
        agent_url: format!("http://{}", task_addr),
        launcher_url: format!("http://{}", launcher_addr),
        recorded,
    }
}

/// Spawn a mock agent whose launcher endpoint is dead
pub async fn spawn_agent_without_launcher(behavior: TaskBehavior) -> MockAgent {
    let recorded = Recorded::default();
    let state = MockState {
        behavior,
        recorded: recorded.clone(),
    };

    let (task_listener, task_addr) = bind().await;
    serve_in_background(task_listener, task_router(state));

    MockAgent {
        agent_url: format!("http://{}", task_addr),
        launcher_url: dead_endpoint().await,
        recorded,
    }
}

/// Spawn a mock agent whose launcher answers but refuses resets
pub async fn spawn_agent_with_rejecting_launcher(behavior: TaskBehavior) -> MockAgent {
    let recorded = Recorded::default();
    let state = MockState {
        behavior,
        recorded: recorded.clone(),
    };

    let (task_listener, task_addr) = bind().await;
    let (launcher_listener, launcher_addr) = bind().await;

    serve_in_background(task_listener, task_router(state.clone()));
    serve_in_background(launcher_listener, launcher_router(state, true));

    MockAgent {
        agent_url: format!("http://{}", task_addr),
        launcher_url: format!("http://{}", launcher_addr),
        recorded,
    }
}
