// ABOUTME: Shared context store with provenance for every entry.
// ABOUTME: A session reset clears everything not flagged persistent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::SharedClock;
use crate::model::{Actor, MetaValue};

/// A value on the blackboard and who put it there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub key: String,
    pub value: MetaValue,
    pub set_by: Actor,
    pub timestamp: DateTime<Utc>,
    /// Survives `clear_non_persistent()`.
    pub persistent: bool,
}

/// Key/value blackboard shared by all actors.
pub struct ContextStore {
    entries: Mutex<BTreeMap<String, ContextEntry>>,
    clock: SharedClock,
}

impl ContextStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    /// Insert or overwrite `key`.
    pub async fn set(
        &self,
        key: &str,
        value: MetaValue,
        actor: Actor,
        persistent: bool,
    ) -> ContextEntry {
        let entry = ContextEntry {
            key: key.to_string(),
            value,
            set_by: actor,
            timestamp: self.clock.now(),
            persistent,
        };

        self.entries
            .lock()
            .await
            .insert(key.to_string(), entry.clone());
        debug!(key = %key, actor = %actor, persistent, "Context set");
        entry
    }

    pub async fn get(&self, key: &str) -> Option<ContextEntry> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Remove `key`, returning whether it existed.
    pub async fn delete(&self, key: &str) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    /// All entries, ordered by key.
    pub async fn list_all(&self) -> Vec<ContextEntry> {
        self.entries.lock().await.values().cloned().collect()
    }

    /// Remove every non-persistent entry and return how many went.
    pub async fn clear_non_persistent(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.persistent);
        let removed = before - entries.len();
        debug!(removed, "Cleared session context");
        removed
    }

    pub(crate) async fn replace(&self, entries: Vec<ContextEntry>) {
        *self.entries.lock().await = entries
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect();
    }

    pub(crate) async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
