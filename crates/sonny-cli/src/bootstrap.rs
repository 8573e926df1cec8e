use std::sync::Arc;

use sonny_cache::{db_index, InventoryCache, InventorySnapshot, RedisInventoryCache, RedisJobQueue};
use sonny_cloud::{CloudApi, HttpCloudClient};
use sonny_core::config::{Config, RedisConfig};
use sonny_core::Result;

/// The shared components every binary wires up: an inventory snapshot
/// over the cloud's Redis database, the job queue sharing that same
/// connection, and a cloud adapter client.
pub struct Context {
    pub config: Config,
    pub cache: Arc<dyn InventoryCache>,
    pub snapshot: Arc<InventorySnapshot>,
    pub queue: Arc<RedisJobQueue>,
    pub cloud: Arc<dyn CloudApi>,
}

pub fn redis_url(redis: &RedisConfig) -> String {
    match &redis.pass {
        Some(pass) => format!("redis://:{pass}@{}", redis.host),
        None => format!("redis://{}", redis.host),
    }
}

/// The cloud API base URL isn't part of the INI schema (spec §6 only
/// names the adapter contract, not its transport) — read from the
/// environment the way an OpenStack `clouds.yaml` deployment would set
/// `OS_AUTH_URL`, falling back to a sensible local default.
fn cloud_api_base_url() -> String {
    std::env::var("SONNY_CLOUD_API_URL").unwrap_or_else(|_| "http://localhost:8774".to_string())
}

pub async fn connect(config: Config) -> Result<Context> {
    let db = db_index(&config.openstack.cloud);
    let url = redis_url(&config.redis);

    let cache: Arc<dyn InventoryCache> = Arc::new(RedisInventoryCache::connect(&url, db).await?);
    let queue = RedisJobQueue::connect(&url, db).await?;
    let snapshot = Arc::new(InventorySnapshot::new(cache.clone()));
    let cloud: Arc<dyn CloudApi> = Arc::new(HttpCloudClient::new(cloud_api_base_url()));

    Ok(Context {
        config,
        cache,
        snapshot,
        queue: Arc::new(queue),
        cloud,
    })
}
