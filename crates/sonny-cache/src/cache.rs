use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sonny_core::aggregate::{Aggregate, AggregateIndex};
use sonny_core::agent::AgentTable;
use sonny_core::host::Host;
use sonny_core::service::Service;
use sonny_core::tenant::Tenant;
use sonny_core::time::{age_secs, now_epoch_secs};
use sonny_core::Result;

use crate::keys::{
    timestamp_key, KEY_AGENTS, KEY_AGGREGATES, KEY_API_ALIVE, KEY_HYPERVISORS, KEY_PROJECTS,
    KEY_RESURRECTION_TIMESTAMP, KEY_SERVERS, KEY_SERVICES,
};

/// Low-level contract for the key/value store backing the inventory (spec
/// §6): raw string get/set plus pub/sub, kept separate from the
/// higher-level job queue even though one Redis connection backs both
/// (Design Note in spec §9 — "keep the two responsibilities behind
/// separate adapters even if backed by one connection").
#[async_trait]
pub trait InventoryCache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;
    async fn set_raw(&self, key: &str, value: String) -> Result<()>;
    async fn publish(&self, topic: &str, message: &str) -> Result<()>;

    /// Subscribe to one or more topics, returning a channel of
    /// `(topic, message)` pairs. The default implementation reports the
    /// backend as not supporting subscription; only backends that can
    /// actually fan out pub/sub traffic (Redis) override it.
    async fn subscribe(
        &self,
        _topics: Vec<String>,
    ) -> Result<tokio::sync::mpsc::UnboundedReceiver<(String, String)>> {
        Err(sonny_core::SonnyError::CacheUnavailable(
            "this cache backend does not support subscribe".into(),
        ))
    }
}

/// Typed read-through view over an [`InventoryCache`] (spec §4.1). No
/// caching layer above the store: every call hits it. Not a transactional
/// view — successive reads may observe different refresh generations.
pub struct InventorySnapshot {
    cache: Arc<dyn InventoryCache>,
}

impl InventorySnapshot {
    pub fn new(cache: Arc<dyn InventoryCache>) -> Self {
        Self { cache }
    }

    /// `now - <key>:timestamp`, or `None` if the timestamp is absent
    /// (unknown freshness).
    pub async fn age(&self, key: &str) -> Result<Option<i64>> {
        let raw = self.cache.get_raw(&timestamp_key(key)).await?;
        Ok(raw.and_then(|v| v.parse::<i64>().ok()).map(age_secs))
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(|e| {
                sonny_core::SonnyError::CacheUnavailable(format!("decode {key}: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Write `key` then `key:timestamp`, in that order — the invariant
    /// every primary-key write must honor (spec §3).
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(|e| {
            sonny_core::SonnyError::CacheUnavailable(format!("encode {key}: {e}"))
        })?;
        self.cache.set_raw(key, raw).await?;
        self.cache
            .set_raw(&timestamp_key(key), now_epoch_secs().to_string())
            .await?;
        Ok(())
    }

    pub async fn hosts(&self) -> Result<Vec<Host>> {
        Ok(self.get_json(KEY_HYPERVISORS).await?.unwrap_or_default())
    }

    pub async fn set_hosts(&self, hosts: &[Host]) -> Result<()> {
        self.set_json(KEY_HYPERVISORS, &hosts).await
    }

    pub async fn agents(&self) -> Result<AgentTable> {
        Ok(self.get_json(KEY_AGENTS).await?.unwrap_or_default())
    }

    pub async fn set_agents(&self, table: &AgentTable) -> Result<()> {
        self.set_json(KEY_AGENTS, table).await
    }

    pub async fn servers(&self) -> Result<Vec<Tenant>> {
        Ok(self.get_json(KEY_SERVERS).await?.unwrap_or_default())
    }

    pub async fn set_servers(&self, servers: &[Tenant]) -> Result<()> {
        self.set_json(KEY_SERVERS, &servers).await
    }

    pub async fn services(&self) -> Result<Vec<Service>> {
        Ok(self.get_json(KEY_SERVICES).await?.unwrap_or_default())
    }

    pub async fn set_services(&self, services: &[Service]) -> Result<()> {
        self.set_json(KEY_SERVICES, &services).await
    }

    pub async fn aggregates(&self) -> Result<AggregateIndex> {
        let list: Vec<Aggregate> = self.get_json(KEY_AGGREGATES).await?.unwrap_or_default();
        Ok(sonny_core::aggregate::index_by_host(&list))
    }

    pub async fn set_aggregates(&self, aggregates: &[Aggregate]) -> Result<()> {
        self.set_json(KEY_AGGREGATES, &aggregates).await
    }

    pub async fn set_projects<T: Serialize + Sync>(&self, projects: &[T]) -> Result<()> {
        self.set_json(KEY_PROJECTS, &projects).await
    }

    /// `get("api_alive", utf8_string) == "True" && age("api_alive") < 60`
    /// (spec §4.1).
    pub async fn api_alive(&self) -> Result<bool> {
        let flag = self.cache.get_raw(KEY_API_ALIVE).await?;
        let fresh = self.age(KEY_API_ALIVE).await?.is_some_and(|a| a < 60);
        Ok(flag.as_deref() == Some("True") && fresh)
    }

    /// Explicit write, mirroring `api_alive()`: an attribute-as-function
    /// pair rather than a property that silently does I/O (spec §9).
    pub async fn set_api_alive(&self, alive: bool) -> Result<()> {
        let value = if alive { "True" } else { "False" };
        self.cache.set_raw(KEY_API_ALIVE, value.to_string()).await?;
        self.cache
            .set_raw(&timestamp_key(KEY_API_ALIVE), now_epoch_secs().to_string())
            .await?;
        Ok(())
    }

    pub async fn resurrection_timestamp(&self) -> Result<Option<i64>> {
        Ok(self
            .cache
            .get_raw(KEY_RESURRECTION_TIMESTAMP)
            .await?
            .and_then(|v| v.parse().ok()))
    }

    pub async fn set_resurrection_timestamp(&self, now: i64) -> Result<()> {
        self.cache
            .set_raw(KEY_RESURRECTION_TIMESTAMP, now.to_string())
            .await
    }

    /// Clear the cooldown marker (the `reset-cooldown` operator command).
    pub async fn clear_resurrection_timestamp(&self) -> Result<()> {
        self.cache
            .set_raw(KEY_RESURRECTION_TIMESTAMP, String::new())
            .await
    }

    pub async fn publish(&self, topic: &str, message: &str) -> Result<()> {
        self.cache.publish(topic, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemCache {
        values: Mutex<HashMap<String, String>>,
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl InventoryCache for MemCache {
        async fn get_raw(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set_raw(&self, key: &str, value: String) -> Result<()> {
            self.values.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn publish(&self, topic: &str, message: &str) -> Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn snapshot() -> InventorySnapshot {
        InventorySnapshot::new(Arc::new(MemCache::default()))
    }

    #[tokio::test]
    async fn api_alive_requires_true_and_fresh_timestamp() {
        let snap = snapshot();
        assert!(!snap.api_alive().await.unwrap());

        snap.set_api_alive(true).await.unwrap();
        assert!(snap.api_alive().await.unwrap());

        snap.set_api_alive(false).await.unwrap();
        assert!(!snap.api_alive().await.unwrap());
    }

    #[tokio::test]
    async fn api_alive_stale_timestamp_is_not_alive() {
        let snap = snapshot();
        snap.cache
            .set_raw("api_alive", "True".to_string())
            .await
            .unwrap();
        snap.cache
            .set_raw("api_alive:timestamp", (now_epoch_secs() - 120).to_string())
            .await
            .unwrap();
        assert!(!snap.api_alive().await.unwrap());
    }

    #[tokio::test]
    async fn set_json_writes_value_then_timestamp() {
        let snap = snapshot();
        let hosts = vec![];
        snap.set_hosts(&hosts).await.unwrap();
        assert!(snap.age("hypervisors").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn age_is_none_when_timestamp_absent() {
        let snap = snapshot();
        assert_eq!(snap.age("hypervisors").await.unwrap(), None);
    }

    #[tokio::test]
    async fn resurrection_timestamp_roundtrips() {
        let snap = snapshot();
        assert_eq!(snap.resurrection_timestamp().await.unwrap(), None);
        snap.set_resurrection_timestamp(1_700_000_000).await.unwrap();
        assert_eq!(
            snap.resurrection_timestamp().await.unwrap(),
            Some(1_700_000_000)
        );
    }
}
