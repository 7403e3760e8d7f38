use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;

/// Key-value store shared between portal instances, holding session, token
/// and permission state. Single-key operations are atomic; there are no
/// cross-key transactions.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Fetch all fields of a hash entry; empty map if the key is absent.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;
    /// Replace a hash entry with the given fields.
    async fn hash_set(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> Result<()>;
}

/// Redis-backed store used in deployment.
pub struct RedisCacheStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis URL")?;
        let manager = redis::aio::ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.manager.clone();
        let value: Option<String> = con.get(key).await.context("redis GET failed")?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut con = self.manager.clone();
        match ttl {
            Some(ttl) => con
                .set_ex::<_, _, ()>(key, value, ttl.as_secs())
                .await
                .context("redis SETEX failed")?,
            None => con
                .set::<_, _, ()>(key, value)
                .await
                .context("redis SET failed")?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut con = self.manager.clone();
        con.del::<_, ()>(key).await.context("redis DEL failed")?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut con = self.manager.clone();
        let fields: HashMap<String, String> =
            con.hgetall(key).await.context("redis HGETALL failed")?;
        Ok(fields)
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut con = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore().hset_multiple(key, fields).ignore();
        if let Some(ttl) = ttl {
            pipe.expire(key, ttl.as_secs() as i64).ignore();
        }
        pipe.query_async::<_, ()>(&mut con)
            .await
            .context("redis HSET pipeline failed")?;
        Ok(())
    }
}

enum Entry {
    Value(String),
    Hash(HashMap<String, String>),
}

/// In-process store for tests and cache-less development setups.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, (Entry, Option<Instant>)>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn deadline(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| Instant::now() + ttl)
    }

    fn live<'a>(entry: Option<&'a (Entry, Option<Instant>)>) -> Option<&'a Entry> {
        match entry {
            Some((value, deadline)) => {
                if deadline.is_some_and(|d| d <= Instant::now()) {
                    None
                } else {
                    Some(value)
                }
            }
            None => None,
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(match Self::live(entries.get(key)) {
            Some(Entry::Value(value)) => Some(value.clone()),
            _ => None,
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            (Entry::Value(value.to_string()), Self::deadline(ttl)),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let entries = self.entries.read().await;
        Ok(match Self::live(entries.get(key)) {
            Some(Entry::Hash(fields)) => fields.clone(),
            _ => HashMap::new(),
        })
    }

    async fn hash_set(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            (Entry::Hash(fields.iter().cloned().collect()), Self::deadline(ttl)),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = InMemoryCacheStore::new();
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn expired_value_reads_as_absent() {
        let cache = InMemoryCacheStore::new();
        cache
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hash_set_replaces_previous_fields() {
        let cache = InMemoryCacheStore::new();
        cache
            .hash_set(
                "h",
                &[("a".into(), "1".into()), ("b".into(), "2".into())],
                None,
            )
            .await
            .unwrap();
        cache
            .hash_set("h", &[("a".into(), "9".into())], None)
            .await
            .unwrap();

        let fields = cache.hash_get_all("h").await.unwrap();
        assert_eq!(fields.get("a").map(String::as_str), Some("9"));
        assert!(!fields.contains_key("b"));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = InMemoryCacheStore::new();
        cache.set("k", "v", None).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
