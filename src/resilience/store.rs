//! Counter store backends.

use crate::{Error, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Shared atomic counters addressed by string keys.
///
/// Implementations must make `incr` atomic per key across processes; expiry is the
/// only deletion mechanism.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value, `None` when the key does not exist (or has expired).
    async fn get(&self, key: &str) -> Result<Option<u64>>;
    /// Increment by one and return the new value. Missing keys start at zero.
    async fn incr(&self, key: &str) -> Result<u64>;
    /// Set (or refresh) the key's time-to-live.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Increment and set expiry. Backends with transactions override this to do both at once.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let count = self.incr(key).await?;
        self.expire(key, ttl).await?;
        Ok(count)
    }

    fn name(&self) -> &'static str;
}

struct CounterEntry {
    count: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }
}

/// In-process store for development and tests. Not shared across instances.
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, CounterEntry>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let mut entries = self.entries.lock().await;
        if entries.get(key).map(|e| e.is_expired()).unwrap_or(false) {
            entries.remove(key);
        }
        Ok(entries.get(key).map(|e| e.count))
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: None,
        });
        if entry.is_expired() {
            entry.count = 0;
            entry.expires_at = None;
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis-backed store. `INCR` + `EXPIRE` run in one MULTI/EXEC transaction.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let value: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut conn = self.conn.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Store speaking the Upstash / Vercel KV REST protocol.
///
/// Single commands are POSTed as a JSON array to the base URL; increment + expiry go to
/// `/multi-exec` as a transaction.
pub struct KvRestCounterStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl KvRestCounterStore {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::store("kv-rest", e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn send(&self, path: &str, body: Value) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::store("kv-rest", e.to_string()))?;

        let status = resp.status();
        let json: Value = resp
            .json()
            .await
            .map_err(|e| Error::store("kv-rest", e.to_string()))?;

        if !status.is_success() {
            let msg = json
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("request failed");
            return Err(Error::store(
                "kv-rest",
                format!("HTTP {}: {}", status.as_u16(), msg),
            ));
        }
        Ok(json)
    }

    fn result_of(item: &Value) -> Result<Value> {
        if let Some(err) = item.get("error").and_then(|e| e.as_str()) {
            return Err(Error::store("kv-rest", err.to_string()));
        }
        Ok(item.get("result").cloned().unwrap_or(Value::Null))
    }

    fn as_count(value: &Value) -> Result<Option<u64>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| Error::store("kv-rest", format!("not a counter: {}", n))),
            Value::String(s) => s
                .parse::<u64>()
                .map(Some)
                .map_err(|_| Error::store("kv-rest", format!("not a counter: {}", s))),
            other => Err(Error::store("kv-rest", format!("not a counter: {}", other))),
        }
    }

    fn require_count(value: &Value) -> Result<u64> {
        Self::as_count(value)?.ok_or_else(|| Error::store("kv-rest", "missing counter value"))
    }
}

#[async_trait]
impl CounterStore for KvRestCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let resp = self.send("", json!(["GET", key])).await?;
        Self::as_count(&Self::result_of(&resp)?)
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let resp = self.send("", json!(["INCR", key])).await?;
        Self::require_count(&Self::result_of(&resp)?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let resp = self
            .send("", json!(["EXPIRE", key, ttl.as_secs().to_string()]))
            .await?;
        Self::result_of(&resp).map(|_| ())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let resp = self
            .send(
                "/multi-exec",
                json!([["INCR", key], ["EXPIRE", key, ttl.as_secs().to_string()]]),
            )
            .await?;
        let first = resp
            .as_array()
            .and_then(|items| items.first())
            .ok_or_else(|| Error::store("kv-rest", "empty transaction response"))?;
        Self::require_count(&Self::result_of(first)?)
    }

    fn name(&self) -> &'static str {
        "kv-rest"
    }
}
