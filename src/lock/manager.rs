// ABOUTME: File lock manager for multi-agent synchronization.
// ABOUTME: Provides lease-style locking of file paths across actors.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::clock::{SharedClock, add_duration};
use crate::error::{CoordError, Result};
use crate::model::{Actor, LockToken};

/// Information about a held file lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLock {
    /// The locked path.
    pub path: String,
    /// The actor that owns the lock.
    pub owner: Actor,
    /// Identifies this particular acquisition.
    pub token: LockToken,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock lapses. None = held until released.
    pub expires_at: Option<DateTime<Utc>>,
}

impl FileLock {
    /// Whether the lease has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }
}

/// File lock manager for multi-agent synchronization.
///
/// Actors lock file paths before editing them so parallel agents do not
/// trample each other's work.
///
/// # Lock Semantics
///
/// - **Exclusive acquire:** `acquire()` succeeds only when no live lock exists,
///   including one the caller already holds. Owners extend with `renew()`.
/// - **Ownership verification:** `release()` and `renew()` return `false` for
///   anyone but the owner and change nothing.
/// - **Lazy expiry:** a lapsed lease is dropped by the first call that looks
///   at it; there is no background sweeper.
///
/// Paths are keys as given; the coordinator canonicalizes them first.
pub struct LockManager {
    locks: Mutex<HashMap<String, FileLock>>,
    clock: SharedClock,
    default_ttl: Option<Duration>,
}

impl LockManager {
    /// Create a lock manager. `default_ttl` applies when `acquire` gets no TTL.
    pub fn new(clock: SharedClock, default_ttl: Option<Duration>) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            clock,
            default_ttl,
        }
    }

    /// Acquire a lock on a path.
    ///
    /// Returns `true` if the lock was created, `false` if a live lock exists.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to lock.
    /// * `actor` - The actor requesting the lock.
    /// * `ttl` - How long the lease lasts. Falls back to the default TTL.
    pub async fn acquire(&self, path: &str, actor: Actor, ttl: Option<Duration>) -> bool {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;

        if let Some(lock) = live(&mut locks, path, now) {
            debug!(path = %path, owner = %lock.owner, requester = %actor, "Lock contended");
            return false;
        }

        let expires_at = ttl.or(self.default_ttl).map(|ttl| add_duration(now, ttl));
        locks.insert(
            path.to_string(),
            FileLock {
                path: path.to_string(),
                owner: actor,
                token: LockToken::new(),
                acquired_at: now,
                expires_at,
            },
        );

        debug!(path = %path, actor = %actor, ?expires_at, "Lock acquired");
        true
    }

    /// Release a lock on a path.
    ///
    /// Returns `true` if the caller owned a live lock and it was released.
    pub async fn release(&self, path: &str, actor: Actor) -> bool {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;

        match live(&mut locks, path, now).map(|lock| lock.owner) {
            Some(owner) if owner == actor => {
                locks.remove(path);
                debug!(path = %path, actor = %actor, "Lock released");
                true
            }
            Some(owner) => {
                debug!(path = %path, owner = %owner, requester = %actor, "Release by non-owner refused");
                false
            }
            None => false,
        }
    }

    /// Extend the caller's lease. `None` makes it permanent unless a default TTL is set.
    ///
    /// Returns `false` if the caller does not hold a live lock on `path`.
    pub async fn renew(&self, path: &str, actor: Actor, ttl: Option<Duration>) -> bool {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;

        let Some(lock) = live_mut(&mut locks, path, now) else {
            return false;
        };
        if lock.owner != actor {
            return false;
        }

        lock.expires_at = ttl.or(self.default_ttl).map(|ttl| add_duration(now, ttl));
        debug!(path = %path, actor = %actor, expires_at = ?lock.expires_at, "Lock renewed");
        true
    }

    /// Release all locks held by an actor, returning the locks dropped.
    ///
    /// This is idempotent - calling it when the actor holds no locks is not an error.
    pub async fn release_all(&self, actor: Actor) -> Vec<FileLock> {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;
        sweep(&mut locks, now);

        let owned: Vec<String> = locks
            .iter()
            .filter(|(_, lock)| lock.owner == actor)
            .map(|(path, _)| path.clone())
            .collect();

        let mut released: Vec<FileLock> =
            owned.iter().filter_map(|path| locks.remove(path)).collect();
        released.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(actor = %actor, released = released.len(), "Released locks for actor");
        released
    }

    /// Check that `actor` may write `path` and keep the lock table held.
    ///
    /// Fails with `Contention` when another actor holds a live lock. While
    /// the returned guard lives, no lock can be acquired, released, or
    /// renewed, so the caller's write cannot race a new owner.
    pub(crate) async fn hold_for_write(&self, path: &str, actor: Actor) -> Result<WriteHold<'_>> {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;

        let holder = live(&mut locks, path, now).map(|lock| lock.owner);
        if let Some(owner) = holder.filter(|&owner| owner != actor) {
            debug!(path = %path, owner = %owner, actor = %actor, "Write blocked by lock");
            return Err(CoordError::Contention {
                path: path.to_string(),
                owner,
            });
        }
        Ok(WriteHold { _locks: locks })
    }

    /// Whether a live lock exists on `path`.
    pub async fn is_locked(&self, path: &str) -> bool {
        self.get(path).await.is_some()
    }

    /// The live lock on `path`, if any.
    pub async fn get(&self, path: &str) -> Option<FileLock> {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;
        live(&mut locks, path, now).cloned()
    }

    /// All live locks, sorted by path.
    pub async fn list_all(&self) -> Vec<FileLock> {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;
        sweep(&mut locks, now);

        let mut all: Vec<_> = locks.values().cloned().collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    /// Live locks whose path matches a glob pattern such as `cards/*.json`.
    pub async fn list_matching(&self, pattern: &str) -> Result<Vec<FileLock>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| CoordError::InvalidRequest(format!("bad glob '{pattern}': {e}")))?;

        Ok(self
            .list_all()
            .await
            .into_iter()
            .filter(|lock| pattern.matches(&lock.path))
            .collect())
    }

    /// Replace the lock table, e.g. from a snapshot. Lapsed entries are dropped.
    pub(crate) async fn replace(&self, entries: Vec<FileLock>) {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;
        *locks = entries
            .into_iter()
            .filter(|lock| !lock.is_expired(now))
            .map(|lock| (lock.path.clone(), lock))
            .collect();
    }

    /// Drop every lock.
    pub(crate) async fn clear(&self) {
        self.locks.lock().await.clear();
    }
}

/// Lock table held for the duration of a write.
pub(crate) struct WriteHold<'a> {
    _locks: MutexGuard<'a, HashMap<String, FileLock>>,
}

/// Look up the live lock on `path`, reclaiming it first if it has lapsed.
fn live<'a>(
    locks: &'a mut HashMap<String, FileLock>,
    path: &str,
    now: DateTime<Utc>,
) -> Option<&'a FileLock> {
    live_mut(locks, path, now).map(|lock| &*lock)
}

fn live_mut<'a>(
    locks: &'a mut HashMap<String, FileLock>,
    path: &str,
    now: DateTime<Utc>,
) -> Option<&'a mut FileLock> {
    if locks.get(path).is_some_and(|lock| lock.is_expired(now)) {
        if let Some(expired) = locks.remove(path) {
            debug!(path = %path, owner = %expired.owner, "Reclaimed expired lock");
        }
        return None;
    }
    locks.get_mut(path)
}

fn sweep(locks: &mut HashMap<String, FileLock>, now: DateTime<Utc>) {
    locks.retain(|path, lock| {
        let keep = !lock.is_expired(now);
        if !keep {
            debug!(path = %path, owner = %lock.owner, "Reclaimed expired lock");
        }
        keep
    });
}
