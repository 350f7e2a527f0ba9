use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cached value could not be decoded: {0}")]
    Decode(String),

    #[error("cache lock poisoned")]
    Poisoned,
}

pub fn permissions_key(user_id: i64) -> String {
    format!("user_permissions:{}", user_id)
}

/// Permission names wrapped as base64 of their JSON array.
pub fn encode(names: &[String]) -> Result<String, CacheError> {
    let json = serde_json::to_vec(names).map_err(|e| CacheError::Decode(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

pub fn decode(raw: &str) -> Result<Vec<String>, CacheError> {
    let json = STANDARD.decode(raw).map_err(|e| CacheError::Decode(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| CacheError::Decode(e.to_string()))
}

/// Point cache for a user's permission list.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<String>>, CacheError>;

    async fn put(&self, key: &str, names: &[String], ttl: Duration) -> Result<(), CacheError>;
}

pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn open(url: &str) -> Result<Self, CacheError> {
        Ok(Self { client: redis::Client::open(url)? })
    }
}

#[async_trait]
impl PermissionCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<String>>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(key).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn put(&self, key: &str, names: &[String], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, encode(names)?, ttl.as_secs()).await?;
        Ok(())
    }
}

/// In-process TTL map, used when no Redis URL is configured.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<String>>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        match entries.get(key) {
            Some((expires, raw)) if *expires > Instant::now() => decode(raw).map(Some),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, names: &[String], ttl: Duration) -> Result<(), CacheError> {
        let raw = encode(names)?;
        self.entries
            .lock()
            .map_err(|_| CacheError::Poisoned)?
            .insert(key.to_string(), (Instant::now() + ttl, raw));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_base64_json() {
        let names = vec!["create_loan".to_string(), "view_loans".to_string()];
        let raw = encode(&names).unwrap();
        assert_eq!(STANDARD.decode(&raw).unwrap(), br#"["create_loan","view_loans"]"#);
        assert_eq!(decode(&raw).unwrap(), names);
        assert!(decode("%%%").is_err());
    }

    #[tokio::test]
    async fn memory_entries_expire() {
        let cache = MemoryCache::new();
        let key = permissions_key(5);
        assert_eq!(key, "user_permissions:5");

        cache.put(&key, &["view_users".to_string()], Duration::from_secs(300)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(vec!["view_users".to_string()]));

        cache.put(&key, &[], Duration::ZERO).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }
}
