//! Key pool state and round-robin cursor
//!
//! The pool holds API keys in insertion order (first added is the primary
//! key) together with one client handle per key. Handles are built by the
//! connector passed to `KeyPool::new` and are rebuilt whenever the key set
//! changes, so a handle never outlives the key it was built for.
//!
//! Keys, handles and the cursor share one `RwLock`: readers always see a
//! consistent (key, handle) pair at the cursor. Concurrent invocations may
//! interleave their `advance` calls, which only affects how evenly load is
//! spread, never which keys exist.

use common::Secret;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Builds the client handle for one key.
pub type Connector<H> = Box<dyn Fn(&str) -> H + Send + Sync>;

struct PoolEntry<H> {
    key: Secret<String>,
    handle: H,
}

struct PoolState<H> {
    entries: Vec<PoolEntry<H>>,
    /// Index of the key the next invocation starts from. Only meaningful
    /// while `entries` is non-empty.
    cursor: usize,
}

/// The key at the cursor, ready for one attempt.
#[derive(Debug, Clone)]
pub struct SelectedKey<H> {
    pub index: usize,
    pub hint: String,
    pub handle: H,
}

/// Redacted view of one pooled key for admin listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyHint {
    pub hint: String,
    pub current: bool,
}

/// Ordered, round-robin pool of API keys.
pub struct KeyPool<H> {
    state: RwLock<PoolState<H>>,
    connector: Connector<H>,
}

impl<H: Clone> KeyPool<H> {
    /// Create an empty pool. `connector` builds the client handle for a key.
    pub fn new(connector: impl Fn(&str) -> H + Send + Sync + 'static) -> Self {
        Self {
            state: RwLock::new(PoolState {
                entries: Vec::new(),
                cursor: 0,
            }),
            connector: Box::new(connector),
        }
    }

    fn connect_all<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<PoolEntry<H>> {
        keys.into_iter()
            .map(|key| PoolEntry {
                key: Secret::new(key.to_string()),
                handle: (self.connector)(key),
            })
            .collect()
    }

    /// Replace every key. Duplicates are dropped keeping first occurrence;
    /// the cursor resets to the first key.
    pub async fn load(&self, keys: impl IntoIterator<Item = String>) {
        let mut unique: Vec<String> = Vec::new();
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }

        let entries = self.connect_all(unique.iter().map(String::as_str));
        let mut state = self.state.write().await;
        state.entries = entries;
        state.cursor = 0;
        info!(keys = state.entries.len(), "key pool loaded");
    }

    /// Append `key` unless it is already pooled. The cursor does not move.
    ///
    /// Returns whether the key was added.
    pub async fn add(&self, key: &str) -> bool {
        let mut state = self.state.write().await;
        if state.entries.iter().any(|e| e.key.expose() == key) {
            debug!("key already in pool, ignoring");
            return false;
        }

        let keys: Vec<String> = state
            .entries
            .iter()
            .map(|e| e.key.expose().clone())
            .chain(std::iter::once(key.to_string()))
            .collect();
        state.entries = self.connect_all(keys.iter().map(String::as_str));

        let hint = Secret::new(key.to_string()).hint();
        info!(key_hint = %hint, keys = state.entries.len(), "key added to pool");
        true
    }

    /// Remove `key`, or every key when `None`.
    ///
    /// Removing a key at or before the cursor keeps the cursor on a valid
    /// key: it shifts back when an earlier key goes, and wraps to the first
    /// key when the removed key was the last one. Returns whether anything
    /// was removed.
    pub async fn remove(&self, key: Option<&str>) -> bool {
        let mut state = self.state.write().await;

        let Some(key) = key else {
            let had_keys = !state.entries.is_empty();
            state.entries.clear();
            state.cursor = 0;
            info!("all keys removed from pool");
            return had_keys;
        };

        let Some(removed) = state.entries.iter().position(|e| e.key.expose() == key) else {
            return false;
        };

        let keys: Vec<String> = state
            .entries
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != removed)
            .map(|(_, e)| e.key.expose().clone())
            .collect();
        state.entries = self.connect_all(keys.iter().map(String::as_str));

        let len = state.entries.len();
        if len == 0 {
            state.cursor = 0;
        } else if removed < state.cursor {
            state.cursor -= 1;
        } else if state.cursor >= len {
            state.cursor = 0;
        }

        info!(keys = len, "key removed from pool");
        true
    }

    /// The key at the cursor, or `None` when the pool is empty.
    pub async fn current(&self) -> Option<SelectedKey<H>> {
        let state = self.state.read().await;
        state.entries.get(state.cursor).map(|entry| SelectedKey {
            index: state.cursor,
            hint: entry.key.hint(),
            handle: entry.handle.clone(),
        })
    }

    /// Move the cursor to the next key, wrapping. No-op when empty.
    pub async fn advance(&self) {
        let mut state = self.state.write().await;
        let len = state.entries.len();
        if len > 0 {
            state.cursor = (state.cursor + 1) % len;
        }
    }

    /// Number of pooled keys.
    pub async fn size(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Whether at least one key is pooled.
    pub async fn is_initialized(&self) -> bool {
        self.size().await > 0
    }

    /// Redacted keys in pool order, marking the one at the cursor.
    pub async fn hints(&self) -> Vec<KeyHint> {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| KeyHint {
                hint: e.key.hint(),
                current: i == state.cursor,
            })
            .collect()
    }

    /// Pool summary for the health endpoint: `status`, `keys_configured` and
    /// the cursor position (null when empty).
    pub async fn health(&self) -> serde_json::Value {
        let state = self.state.read().await;
        let total = state.entries.len();
        let (status, cursor) = if total > 0 {
            ("healthy", Some(state.cursor))
        } else {
            ("unconfigured", None)
        };
        serde_json::json!({
            "status": status,
            "keys_configured": total,
            "cursor": cursor,
        })
    }
}
