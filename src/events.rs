//! Live-update broadcasting for battle state changes.
//!
//! Subscribers receive a full snapshot of all battles on subscription and
//! an incremental delta for every state transition afterwards. Delivery is
//! best-effort: each subscriber reads from its own bounded buffer, and a
//! subscriber that falls behind is lagged by the channel rather than
//! stalling the scheduler; the connection layer resynchronizes it with a
//! fresh snapshot. Per battle, deltas keep the scheduler's order on any
//! one connection; no order is guaranteed across battles.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;
use crate::model::Battle;
use crate::storage::PersistenceGateway;

/// A single battle update as pushed to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleDelta {
    /// The battle after the transition
    pub battle: Battle,
}

/// Message framing on the live-update stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Full current battle list, sent on subscription and on resync
    Snapshot { battles: Vec<Battle> },
    /// One battle changed state
    Delta { battle: Battle },
}

/// Publishes battle state changes to any number of subscribers
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<BattleDelta>,
    store: Arc<dyn PersistenceGateway>,
}

/// A live subscription: the snapshot taken at subscribe time plus the
/// delta receiver for everything after it
pub struct Subscription {
    /// All battles as of subscription
    pub snapshot: Vec<Battle>,
    /// Transitions published after the snapshot
    pub deltas: broadcast::Receiver<BattleDelta>,
}

impl EventBroadcaster {
    /// Create a broadcaster with the given per-subscriber buffer capacity
    pub fn new(store: Arc<dyn PersistenceGateway>, buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx, store }
    }

    /// Publish a state transition. Succeeds even with no subscribers.
    pub fn publish(&self, battle: Battle) {
        let delta = BattleDelta { battle };
        // send only fails when there are no receivers; that is fine
        let receivers = self.tx.send(delta).unwrap_or(0);
        debug!(receivers, "Published battle delta");
    }

    /// Subscribe, receiving the current battle list and a delta stream.
    ///
    /// The receiver is registered before the snapshot is read, so a
    /// transition landing in between is seen at least once (possibly in
    /// both the snapshot and a delta, never in neither).
    pub async fn subscribe(&self) -> Result<Subscription> {
        let deltas = self.tx.subscribe();
        let snapshot = self.store.list_battles().await?;
        Ok(Subscription { snapshot, deltas })
    }

    /// Fresh snapshot for resynchronizing a lagged subscriber
    pub async fn snapshot(&self) -> Result<Vec<Battle>> {
        self.store.list_battles().await
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
