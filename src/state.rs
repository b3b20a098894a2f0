//! Shared key/value state for the running service.
//!
//! A [`StateRegistry`] holds arbitrary values (configuration, counters,
//! metrics tables) keyed by string. It is owned by the application and
//! handed to components as an `Arc<StateRegistry>`; there is no process-wide
//! singleton, so tests can run side by side with isolated state.
//!
//! All access goes through one mutex. Single operations are atomic, and
//! [`StateRegistry::update`] performs a read-modify-write under the lock so
//! counters and metrics never lose increments under a multi-threaded runtime.

use anyhow::{bail, Result};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Key holding the request trace counter (`u64`).
pub const STATE_TRACEID: &str = "state-traceid";
/// Key holding the [`MetricsTable`].
pub const STATE_METRICS: &str = "state-metrics";
/// Key holding the loaded [`Config`](crate::config::Config).
pub const STATE_CONFIG: &str = "state-config";

/// Key holding the request body limit (`usize`) read by the logging middleware.
pub const STATE_MAX_BODY_BYTES: &str = "state-max-body-bytes";

/// Request counts: username → URL → status code → count.
pub type MetricsTable = BTreeMap<String, BTreeMap<String, BTreeMap<u16, u64>>>;

type Slot = Box<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct StateRegistry {
    values: Mutex<HashMap<String, Slot>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores `value` under `key`, replacing any previous value, and returns it.
    pub fn set<T>(&self, key: &str, value: T) -> T
    where
        T: Any + Send + Sync + Clone,
    {
        self.lock().insert(key.to_string(), Box::new(value.clone()));
        value
    }

    /// Returns a clone of the value under `key`.
    ///
    /// `None` means the key is absent or holds a value of another type. A
    /// stored `Option::None` comes back as `Some(None)`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Any + Clone,
    {
        self.lock()
            .get(key)
            .and_then(|slot| slot.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Removes `key`. Errors if nothing is stored under it.
    pub fn remove(&self, key: &str) -> Result<()> {
        match self.lock().remove(key) {
            Some(_) => Ok(()),
            None => bail!("state key not found: {}", key),
        }
    }

    /// Atomically reads, modifies and writes the value under `key`.
    ///
    /// The slot is initialized with `init()` when missing. A value of another
    /// type stored under `key` is discarded and replaced by `init()`, so each
    /// key should be used with a single type.
    pub fn update<T, R>(&self, key: &str, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Any + Send + Sync,
    {
        let mut values = self.lock();
        let mut value: Box<T> = match values.remove(key).map(|slot| slot.downcast::<T>()) {
            Some(Ok(value)) => value,
            Some(Err(_)) => {
                tracing::warn!(key, "state value has a different type, reinitializing");
                Box::new(init())
            }
            None => Box::new(init()),
        };
        let result = f(&mut value);
        values.insert(key.to_string(), value);
        result
    }

    /// Current trace number, initializing the counter to 0 on first use.
    pub fn current_trace_id(&self) -> u64 {
        self.update(STATE_TRACEID, || 0u64, |id| *id)
    }

    /// Advances the trace counter by one and returns the new value.
    pub fn advance_trace_id(&self) -> u64 {
        self.update(STATE_TRACEID, || 0u64, |id| {
            *id += 1;
            *id
        })
    }

    /// Increments the count at `[username][url][status]` and returns it.
    pub fn record_metric(&self, username: &str, url: &str, status: u16) -> u64 {
        self.update(STATE_METRICS, MetricsTable::new, |metrics| {
            let count = metrics
                .entry(username.to_string())
                .or_default()
                .entry(url.to_string())
                .or_default()
                .entry(status)
                .or_insert(0);
            *count += 1;
            *count
        })
    }

    /// Snapshot of the metrics table (empty before the first request).
    pub fn metrics(&self) -> MetricsTable {
        self.get::<MetricsTable>(STATE_METRICS).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_returns_value_and_get_reads_it() {
        let state = StateRegistry::new();
        assert_eq!(state.set("test_param", "test_val".to_string()), "test_val");
        assert_eq!(state.get::<String>("test_param").as_deref(), Some("test_val"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let state = StateRegistry::new();
        assert!(state.get::<String>("missing").is_none());
    }

    #[test]
    fn test_stored_none_is_distinct_from_missing() {
        let state = StateRegistry::new();
        state.set::<Option<u32>>("maybe", None);
        assert_eq!(state.get::<Option<u32>>("maybe"), Some(None));
        assert_eq!(state.get::<Option<u32>>("absent"), None);
    }

    #[test]
    fn test_last_writer_wins() {
        let state = StateRegistry::new();
        state.set("k", 1u32);
        state.set("k", 2u32);
        assert_eq!(state.get::<u32>("k"), Some(2));
    }

    #[test]
    fn test_remove() {
        let state = StateRegistry::new();
        state.set("test_param", "test_val".to_string());
        state.remove("test_param").unwrap();
        assert!(!state.contains("test_param"));
        assert!(state.remove("test_param").is_err());
    }

    #[test]
    fn test_update_replaces_value_of_other_type() {
        let state = StateRegistry::new();
        state.set("k", "text".to_string());
        let n = state.update("k", || 10u64, |n| {
            *n += 1;
            *n
        });
        assert_eq!(n, 11);
        assert_eq!(state.get::<u64>("k"), Some(11));
        assert!(state.get::<String>("k").is_none());
    }

    #[test]
    fn test_trace_counter_starts_at_zero() {
        let state = StateRegistry::new();
        assert_eq!(state.current_trace_id(), 0);
        assert_eq!(state.advance_trace_id(), 1);
        assert_eq!(state.current_trace_id(), 1);
    }

    #[test]
    fn test_metrics_created_lazily() {
        let state = StateRegistry::new();
        assert!(state.metrics().is_empty());
        state.record_metric("alice", "/api/search/query", 200);
        state.record_metric("alice", "/api/search/query", 200);
        state.record_metric("alice", "/api/search/query", 500);
        let metrics = state.metrics();
        assert_eq!(metrics["alice"]["/api/search/query"][&200], 2);
        assert_eq!(metrics["alice"]["/api/search/query"][&500], 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let state = Arc::new(StateRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        state.advance_trace_id();
                        state.record_metric("u", "/e", 200);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(state.current_trace_id(), 2000);
        assert_eq!(state.metrics()["u"]["/e"][&200], 2000);
    }
}
