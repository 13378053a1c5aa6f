//! Redis integration service implementation
//!
//! Redis binding of the key-value store. All keys are namespaced with the
//! configured prefix; callers only ever see unprefixed keys.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::{debug, info, warn};

use super::store::KeyValueStore;
use crate::config::RedisConfig;
use crate::utils::errors::Result;

const SCAN_BATCH: usize = 100;

const DELETE_IF_EQUALS: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Redis store shared by every handler task
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// Connect and keep a multiplexed connection manager
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client.clone()).await?;

        info!(prefix = %config.prefix, "Redis store connected");
        Ok(Self {
            client,
            conn,
            prefix: config.prefix.clone(),
        })
    }

    /// The underlying client, for consumers that need a dedicated connection
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn strip_prefix(&self, key: String) -> String {
        match key.strip_prefix(self.prefix.as_str()) {
            Some(stripped) => stripped.to_string(),
            None => key,
        }
    }

    /// Health check for Redis connection
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(response) => Ok(response == "PONG"),
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let full_key = self.full_key(key);

        let mut cmd = redis::cmd("SET");
        cmd.arg(&full_key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        cmd.query_async::<_, ()>(&mut conn).await?;

        debug!(key = %full_key, ttl = ?ttl, "Value set in Redis");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let full_key = self.full_key(key);

        let value: Option<String> = conn.get(&full_key).await?;

        debug!(key = %full_key, found = value.is_some(), "Value read from Redis");
        Ok(value)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let full_keys: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();

        let deleted: u64 = conn.del(&full_keys).await?;

        debug!(requested = keys.len(), deleted = deleted, "Keys deleted from Redis");
        Ok(deleted)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let full_pattern = self.full_key(pattern);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch.into_iter().map(|k| self.strip_prefix(k)));

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = %full_pattern, count = keys.len(), "Keys scanned in Redis");
        Ok(keys)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let full_key = self.full_key(key);

        let reply: Option<String> = redis::cmd("SET")
            .arg(&full_key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        let created = reply.is_some();
        debug!(key = %full_key, created = created, "Conditional set in Redis");
        Ok(created)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let full_key = self.full_key(key);

        let deleted: i64 = Script::new(DELETE_IF_EQUALS)
            .key(&full_key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;

        debug!(key = %full_key, deleted = deleted, "Conditional delete in Redis");
        Ok(deleted == 1)
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let full_key = self.full_key(key);

        let ttl: i64 = conn.ttl(&full_key).await?;

        debug!(key = %full_key, ttl = ttl, "TTL retrieved for key");
        Ok(ttl)
    }
}
