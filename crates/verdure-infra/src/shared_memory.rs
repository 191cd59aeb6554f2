//! Process-wide shared memory: a concurrent keyed store with TTL
//!
//! The only mutable process-wide state visible to agents, and agents may
//! only read it. Expired entries are removed lazily on access and eagerly
//! by a sweeper task running every 60 seconds.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use verdure_types::{Result, VerdureError};

/// Interval between eager expiry sweeps
const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    stored_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if now > expiry)
    }
}

/// Concurrent `key -> (value, stored_at, expires_at?)` map
pub struct SharedMemory {
    entries: RwLock<HashMap<String, Entry>>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store a value, replacing any existing entry under the key
    pub fn store(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        let now = Utc::now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: now,
                expires_at: ttl.map(|d| now + d),
            },
        );
        debug!(key, "shared memory store");
        Ok(())
    }

    /// Store a value only if no live entry exists under the key.
    ///
    /// Used to refuse signal overwrites across phases; an expired entry
    /// does not block the store.
    pub fn store_unique(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        if let Some(existing) = entries.get(key) {
            if !existing.is_expired(now) {
                return Err(VerdureError::InvalidInput(format!(
                    "key '{}' already holds a live value",
                    key
                )));
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: now,
                expires_at: ttl.map(|d| now + d),
            },
        );
        Ok(())
    }

    /// Serialize and store a typed value
    pub fn store_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        self.store(key, serde_json::to_value(value)?, ttl)
    }

    /// Retrieve a live value; expired entries are removed and read as absent
    pub fn get(&self, key: &str) -> Result<serde_json::Value> {
        let now = Utc::now();
        {
            let entries = self
                .entries
                .read()
                .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(entry.value.clone()),
                None => return Err(VerdureError::NotFound(key.to_string())),
                Some(_) => {}
            }
        }
        // Lazy removal of the expired entry
        let mut entries = self
            .entries
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(now) {
                entries.remove(key);
            }
        }
        Err(VerdureError::NotFound(key.to_string()))
    }

    /// Retrieve and deserialize a live value
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key)?;
        Ok(serde_json::from_value(value)?)
    }

    /// All live `signal:`-prefixed values stored within the window
    pub fn get_recent_signals(&self, window: Duration) -> Result<Vec<serde_json::Value>> {
        let now = Utc::now();
        let cutoff = now - window;
        let entries = self
            .entries
            .read()
            .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
        Ok(entries
            .iter()
            .filter(|(key, entry)| {
                key.starts_with("signal:") && entry.stored_at > cutoff && !entry.is_expired(now)
            })
            .map(|(_, entry)| entry.value.clone())
            .collect())
    }

    /// Remove all expired entries, returning the count removed
    pub fn clear_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| VerdureError::LockError("Failed to acquire write lock".to_string()))?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    pub fn len(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| VerdureError::LockError("Failed to acquire read lock".to_string()))?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Spawn the eager expiry sweeper; stops when `shutdown` flips to true
    pub fn spawn_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let memory = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match memory.clear_expired() {
                            Ok(0) => {}
                            Ok(count) => info!(count, "shared memory sweeper removed expired entries"),
                            Err(e) => tracing::error!(error = %e, "shared memory sweep failed"),
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}
