//! Per-agent battle locks.
//!
//! An agent may only be inside one battle's reset/active window at a time.
//! The scheduler acquires the lock of every participant before issuing
//! resets and holds it until the battle reaches a terminal state. Guards
//! are owned, so dropping them on any exit path (success, timeout, error,
//! task abort) releases the agent exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::AgentId;

/// Guard over one agent's battle window; releases on drop
pub type AgentGuard = OwnedMutexGuard<()>;

/// Registry of per-agent locks
#[derive(Clone, Default)]
pub struct AgentLockSet {
    locks: Arc<std::sync::Mutex<HashMap<AgentId, Arc<Mutex<()>>>>>,
}

impl AgentLockSet {
    /// Create an empty lock set
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: AgentId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("agent lock map poisoned");
        // A strong count of one means only the map still knows the lock:
        // no guard and no waiter. Sweeping here keeps the map bounded by
        // the set of agents currently in a battle window.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Acquire one agent's lock, waiting until any other battle releases it
    pub async fn acquire(&self, id: AgentId) -> AgentGuard {
        self.lock_for(id).lock_owned().await
    }

    /// Acquire the locks of all given agents.
    ///
    /// Ids are deduplicated and taken in sorted order so two battles
    /// sharing agents cannot deadlock against each other.
    pub async fn acquire_all(&self, ids: &[AgentId]) -> Vec<AgentGuard> {
        let mut sorted: Vec<AgentId> = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            guards.push(self.acquire(id).await);
        }
        guards
    }

    /// Whether the agent is currently claimed by a battle. Read-only:
    /// asking about an unknown agent does not create an entry.
    pub fn is_held(&self, id: AgentId) -> bool {
        let locks = self.locks.lock().expect("agent lock map poisoned");
        locks
            .get(&id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().expect("agent lock map poisoned").len()
    }
}
