//! Shared atomic key-value store.
//!
//! All cross-process auth state (refresh records, ephemeral credentials,
//! rate counters) lives behind this trait. A process may hold request-scoped
//! read results but never an authoritative cache; correctness of rotation,
//! consume-once, and rate accounting depends on the store's atomic
//! primitives.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, Script};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: i64)
        -> Result<(), anyhow::Error>;

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error>;

    /// Atomic get-and-delete: concurrent callers see at most one `Some`.
    async fn get_del(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    /// Atomic compare-and-swap, preserving the key's TTL. Returns whether
    /// the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, anyhow::Error>;

    /// Atomic increment. The first increment of a key starts its window by
    /// setting `ttl_seconds`. Returns the post-increment count and the
    /// remaining TTL according to the store's clock.
    async fn incr_ex(&self, key: &str, ttl_seconds: i64) -> Result<(i64, i64), anyhow::Error>;

    /// Add a member to a set and refresh the set's TTL.
    async fn add_to_set(
        &self,
        key: &str,
        member: &str,
        ttl_seconds: i64,
    ) -> Result<(), anyhow::Error>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

// CAS and windowed increment run as Lua so each is one atomic round trip.
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
    return 1
end
return 0
"#;

const INCR_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('TTL', KEYS[1])
if ttl < 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    manager: ConnectionManager,
    cas_script: Script,
    incr_script: Script,
}

impl RedisStore {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects automatically
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
            cas_script: Script::new(CAS_SCRIPT),
            incr_script: Script::new(INCR_SCRIPT),
        })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get key: {}", e))
    }

    async fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set key: {}", e))
    }

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete key: {}", e))?;
        Ok(removed > 0)
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get-and-delete key: {}", e))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let swapped: i64 = self
            .cas_script
            .key(key)
            .arg(expected)
            .arg(new)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to compare-and-swap key: {}", e))?;
        Ok(swapped == 1)
    }

    async fn incr_ex(&self, key: &str, ttl_seconds: i64) -> Result<(i64, i64), anyhow::Error> {
        let mut conn = self.manager.clone();
        let (count, ttl): (i64, i64) = self
            .incr_script
            .key(key)
            .arg(ttl_seconds.max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to increment key: {}", e))?;
        Ok((count, ttl))
    }

    async fn add_to_set(
        &self,
        key: &str,
        member: &str,
        ttl_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to add set member: {}", e))?;
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds.max(1))
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to expire set: {}", e))?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read set members: {}", e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

struct ValueEntry {
    value: String,
    expires_at: Option<Instant>,
}

struct SetEntry {
    members: HashSet<String>,
    expires_at: Option<Instant>,
}

/// Process-local store for tests and standalone runs.
///
/// Implements the same TTL and atomicity semantics as the Redis-backed
/// store, with a clock that tests can advance to cross TTL boundaries
/// without sleeping.
pub struct InMemoryStore {
    values: Mutex<HashMap<String, ValueEntry>>,
    sets: Mutex<HashMap<String, SetEntry>>,
    skew: Mutex<Duration>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            sets: Mutex::new(HashMap::new()),
            skew: Mutex::new(Duration::ZERO),
        }
    }

    /// Shift this store's clock forward, expiring entries whose TTL has
    /// passed.
    pub fn advance(&self, by: Duration) {
        let mut skew = self.skew.lock().expect("skew mutex poisoned");
        *skew += by;
    }

    fn now(&self) -> Instant {
        let skew = *self.skew.lock().expect("skew mutex poisoned");
        Instant::now() + skew
    }

    fn live_value<'a>(
        now: Instant,
        map: &'a mut HashMap<String, ValueEntry>,
        key: &str,
    ) -> Option<&'a mut ValueEntry> {
        if let Some(entry) = map.get(key) {
            if entry.expires_at.is_some_and(|at| at <= now) {
                map.remove(key);
                return None;
            }
        }
        map.get_mut(key)
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let now = self.now();
        let mut map = self.values.lock().expect("value map mutex poisoned");
        Ok(Self::live_value(now, &mut map, key).map(|e| e.value.clone()))
    }

    async fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        let now = self.now();
        let mut map = self.values.lock().expect("value map mutex poisoned");
        map.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: Some(now + Duration::from_secs(ttl_seconds.max(1) as u64)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error> {
        let now = self.now();
        let mut map = self.values.lock().expect("value map mutex poisoned");
        let live = Self::live_value(now, &mut map, key).is_some();
        map.remove(key);
        Ok(live)
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let now = self.now();
        let mut map = self.values.lock().expect("value map mutex poisoned");
        let live = Self::live_value(now, &mut map, key).map(|e| e.value.clone());
        map.remove(key);
        Ok(live)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, anyhow::Error> {
        let now = self.now();
        let mut map = self.values.lock().expect("value map mutex poisoned");
        match Self::live_value(now, &mut map, key) {
            Some(entry) if entry.value == expected => {
                entry.value = new.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr_ex(&self, key: &str, ttl_seconds: i64) -> Result<(i64, i64), anyhow::Error> {
        let now = self.now();
        let mut map = self.values.lock().expect("value map mutex poisoned");
        match Self::live_value(now, &mut map, key) {
            Some(entry) => {
                let count: i64 = entry.value.parse().unwrap_or(0) + 1;
                entry.value = count.to_string();
                let ttl = entry
                    .expires_at
                    .map(|at| ceil_seconds(at.saturating_duration_since(now)))
                    .unwrap_or(ttl_seconds);
                Ok((count, ttl))
            }
            None => {
                let ttl = ttl_seconds.max(1);
                map.insert(
                    key.to_string(),
                    ValueEntry {
                        value: "1".to_string(),
                        expires_at: Some(now + Duration::from_secs(ttl as u64)),
                    },
                );
                Ok((1, ttl))
            }
        }
    }

    async fn add_to_set(
        &self,
        key: &str,
        member: &str,
        ttl_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        let now = self.now();
        let mut map = self.sets.lock().expect("set map mutex poisoned");
        if let Some(entry) = map.get(key) {
            if entry.expires_at.is_some_and(|at| at <= now) {
                map.remove(key);
            }
        }
        let entry = map.entry(key.to_string()).or_insert_with(|| SetEntry {
            members: HashSet::new(),
            expires_at: None,
        });
        entry.members.insert(member.to_string());
        entry.expires_at = Some(now + Duration::from_secs(ttl_seconds.max(1) as u64));
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, anyhow::Error> {
        let now = self.now();
        let mut map = self.sets.lock().expect("set map mutex poisoned");
        if let Some(entry) = map.get(key) {
            if entry.expires_at.is_some_and(|at| at <= now) {
                map.remove(key);
            }
        }
        Ok(map
            .get(key)
            .map(|e| e.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

fn ceil_seconds(d: Duration) -> i64 {
    let secs = d.as_secs() as i64;
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
