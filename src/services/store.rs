//! Key-value store abstraction
//!
//! Locks, conversation state and token usage records all live in a store
//! with Redis semantics: single-key operations, per-key expiry and glob
//! pattern scans. `RedisStore` is the production binding, `MemoryStore`
//! the in-process one.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::utils::errors::{BillyError, Result};

/// `ttl` result for a key without expiry
pub const TTL_PERSISTENT: i64 = -1;
/// `ttl` result for a missing key
pub const TTL_MISSING: i64 = -2;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Set a value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// All keys matching a glob pattern (`*`, `?`, `[...]`, `\` escapes)
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Atomically create `key` holding `value` unless it exists. Returns whether it was created.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Atomically delete `key` only while it still holds `value`
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool>;

    /// Remaining lifetime in seconds, `TTL_PERSISTENT` or `TTL_MISSING`
    async fn ttl(&self, key: &str) -> Result<i64>;
}

/// JSON helpers on top of any store
#[async_trait]
pub trait KeyValueStoreExt {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl).await
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// In-process store with lazy expiry, driven by the tokio clock
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        f(&mut entries)
    }
}

/// Escape glob metacharacters so `raw` only matches itself inside a pattern
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Translate a Redis glob into an anchored regex
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expression = String::with_capacity(pattern.len() + 2);
    expression.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            '\\' => {
                if let Some(literal) = chars.next() {
                    expression.push_str(&regex::escape(&literal.to_string()));
                }
            }
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');

    Regex::new(&expression)
        .map_err(|e| BillyError::InvalidInput(format!("Invalid key pattern {}: {}", pattern, e)))
}

fn rounded_seconds(remaining: Duration) -> i64 {
    ((remaining.as_millis() + 500) / 1000) as i64
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.with_entries(|entries| entries.insert(key.to_string(), entry));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_entries(|entries| entries.get(key).map(|e| e.value.clone())))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        Ok(self.with_entries(|entries| {
            keys.iter().filter(|key| entries.remove(key.as_str()).is_some()).count() as u64
        }))
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = glob_to_regex(pattern)?;
        let keys: Vec<String> = self.with_entries(|entries| {
            entries
                .keys()
                .filter(|key| matcher.is_match(key))
                .cloned()
                .collect()
        });
        debug!(pattern = pattern, count = keys.len(), "Keys scanned");
        Ok(keys)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        Ok(self.with_entries(|entries| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            true
        }))
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool> {
        Ok(self.with_entries(|entries| match entries.get(key) {
            Some(entry) if entry.value == value => entries.remove(key).is_some(),
            _ => false,
        }))
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        Ok(self.with_entries(|entries| match entries.get(key) {
            None => TTL_MISSING,
            Some(Entry { expires_at: None, .. }) => TTL_PERSISTENT,
            Some(Entry { expires_at: Some(at), .. }) => {
                rounded_seconds(at.saturating_duration_since(Instant::now()))
            }
        }))
    }
}
