// ABOUTME: Coordinator configuration - lock defaults, conflict policy, events.
// ABOUTME: Built with chained setters or parsed from a JSON document.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// TTL applied when a lock is acquired without one.
    /// If None, such locks never expire.
    #[serde(with = "opt_millis", rename = "default_lock_ttl_ms")]
    pub default_lock_ttl: Option<Duration>,

    /// Maximum gap between two changes for them to count as concurrent.
    /// If None, any stale pair of adjacent changes is a conflict.
    #[serde(with = "opt_millis", rename = "conflict_window_ms")]
    pub conflict_window: Option<Duration>,

    /// Reject writes to paths locked by a different actor.
    pub enforce_locks: bool,

    /// Append a change log record for reads as well as mutations.
    pub record_reads: bool,

    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_lock_ttl: None,
            conflict_window: None,
            enforce_locks: false,
            record_reads: false,
            event_capacity: 256,
        }
    }
}

impl CoordinatorConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the TTL used when a lock is acquired without one.
    pub fn default_lock_ttl(mut self, ttl: Duration) -> Self {
        self.default_lock_ttl = Some(ttl);
        self
    }

    /// Bound the time gap within which stale changes count as conflicts.
    pub fn conflict_window(mut self, window: Duration) -> Self {
        self.conflict_window = Some(window);
        self
    }

    /// Enable or disable lock enforcement on writes.
    pub fn enforce_locks(mut self, enforce: bool) -> Self {
        self.enforce_locks = enforce;
        self
    }

    /// Enable or disable logging of reads.
    pub fn record_reads(mut self, record: bool) -> Self {
        self.record_reads = record;
        self
    }

    /// Set the event channel capacity (minimum 1).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.default_lock_ttl, None);
        assert_eq!(config.conflict_window, None);
        assert!(!config.enforce_locks);
        assert!(!config.record_reads);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_builder() {
        let config = CoordinatorConfig::new()
            .default_lock_ttl(Duration::from_secs(30))
            .conflict_window(Duration::from_secs(5))
            .enforce_locks(true)
            .event_capacity(0);

        assert_eq!(config.default_lock_ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.conflict_window, Some(Duration::from_secs(5)));
        assert!(config.enforce_locks);
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            CoordinatorConfig::from_json_str(r#"{"default_lock_ttl_ms": 1500, "record_reads": true}"#)
                .unwrap();

        assert_eq!(config.default_lock_ttl, Some(Duration::from_millis(1500)));
        assert!(config.record_reads);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = CoordinatorConfig::from_json_str("{not json").unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InvalidInput);
    }
}
