use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sonny_core::job::{JobEnvelope, JobOutcome, JobRequest, JobStatus};
use sonny_core::{Result, SonnyError};

use crate::cache::InventoryCache;
use crate::queue::JobQueue;

const QUEUE_KEY: &str = "sonny:jobs:queue";
const STATUS_PREFIX: &str = "sonny:jobs:status:";
const OUTCOME_PREFIX: &str = "sonny:jobs:outcome:";

fn map_err(context: &str) -> impl Fn(redis::RedisError) -> SonnyError + '_ {
    move |e| SonnyError::CacheUnavailable(format!("{context}: {e}"))
}

/// `InventoryCache` and `JobQueue` backed by one Redis connection, per the
/// design note that the two responsibilities stay behind separate
/// adapters even when one connection serves both.
#[derive(Clone)]
pub struct RedisInventoryCache {
    conn: ConnectionManager,
    url: String,
    db_index: u8,
}

impl RedisInventoryCache {
    pub async fn connect(url: &str, db_index: u8) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| SonnyError::CacheUnavailable(format!("invalid redis url: {e}")))?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(map_err("connect"))?;
        redis::cmd("SELECT")
            .arg(db_index)
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_err("select db"))?;
        Ok(Self {
            conn,
            url: url.to_string(),
            db_index,
        })
    }

    fn namespaced(&self, topic: &str) -> String {
        format!("{}:{topic}", self.db_index)
    }
}

#[async_trait]
impl InventoryCache for RedisInventoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_err("get"))
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(map_err("set"))
    }

    async fn publish(&self, topic: &str, message: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(self.namespaced(topic), message)
            .await
            .map_err(map_err("publish"))
    }

    async fn subscribe(
        &self,
        topics: Vec<String>,
    ) -> Result<tokio::sync::mpsc::UnboundedReceiver<(String, String)>> {
        use futures::StreamExt;

        // Redis pub/sub channels aren't scoped by the selected db, so a
        // cloud's topic name is namespaced by its db index here instead
        // — two clouds sharing one Redis instance never see each other's
        // messages even if they pick the same topic string.
        let namespaced: Vec<String> = topics.iter().map(|t| self.namespaced(t)).collect();

        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| SonnyError::CacheUnavailable(format!("invalid redis url: {e}")))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(map_err("open pubsub"))?;
        pubsub
            .subscribe(&namespaced)
            .await
            .map_err(map_err("subscribe"))?;

        let prefix = format!("{}:", self.db_index);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name();
                let topic = channel.strip_prefix(&prefix).unwrap_or(channel).to_string();
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if tx.send((topic, payload)).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
}

impl RedisJobQueue {
    pub async fn connect(url: &str, db_index: u8) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| SonnyError::CacheUnavailable(format!("invalid redis url: {e}")))?;
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(map_err("connect"))?;
        redis::cmd("SELECT")
            .arg(db_index)
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_err("select db"))?;
        Ok(Self { conn })
    }

    fn status_key(job_id: &str) -> String {
        format!("{STATUS_PREFIX}{job_id}")
    }

    fn outcome_key(job_id: &str) -> String {
        format!("{OUTCOME_PREFIX}{job_id}")
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, request: JobRequest) -> Result<String> {
        let envelope = JobEnvelope::new(request);
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| SonnyError::CacheUnavailable(format!("encode job: {e}")))?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(QUEUE_KEY, payload)
            .await
            .map_err(map_err("enqueue"))?;
        conn.set::<_, _, ()>(Self::status_key(&envelope.id), "queued")
            .await
            .map_err(map_err("set status"))?;
        Ok(envelope.id)
    }

    async fn status(&self, job_id: &str) -> Result<Option<JobStatus>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::status_key(job_id))
            .await
            .map_err(map_err("status"))?;
        Ok(raw.and_then(|s| match s.as_str() {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "finished" => Some(JobStatus::Finished),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }))
    }

    async fn outcome(&self, job_id: &str) -> Result<Option<JobOutcome>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::outcome_key(job_id))
            .await
            .map_err(map_err("outcome"))?;
        raw.map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| SonnyError::CacheUnavailable(format!("decode outcome: {e}")))
        })
        .transpose()
    }

    async fn dequeue(&self, timeout_secs: u64) -> Result<Option<JobEnvelope>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .brpop(QUEUE_KEY, timeout_secs as f64)
            .await
            .map_err(map_err("dequeue"))?;
        let Some((_, payload)) = popped else {
            return Ok(None);
        };
        let envelope: JobEnvelope = serde_json::from_str(&payload)
            .map_err(|e| SonnyError::CacheUnavailable(format!("decode job: {e}")))?;
        conn.set::<_, _, ()>(Self::status_key(&envelope.id), "running")
            .await
            .map_err(map_err("mark running"))?;
        Ok(Some(envelope))
    }

    async fn finish(&self, job_id: &str, outcome: JobOutcome) -> Result<()> {
        let mut conn = self.conn.clone();
        let status = match &outcome {
            JobOutcome::Error { .. } => "failed",
            _ => "finished",
        };
        let payload = serde_json::to_string(&outcome)
            .map_err(|e| SonnyError::CacheUnavailable(format!("encode outcome: {e}")))?;
        conn.set::<_, _, ()>(Self::status_key(job_id), status)
            .await
            .map_err(map_err("set status"))?;
        conn.set::<_, _, ()>(Self::outcome_key(job_id), payload)
            .await
            .map_err(map_err("set outcome"))
    }

    async fn purge_all(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(QUEUE_KEY).await.map_err(map_err("purge queue"))?;
        let pattern = format!("{STATUS_PREFIX}*");
        let keys: Vec<String> = conn.keys(&pattern).await.map_err(map_err("scan status"))?;
        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await.map_err(map_err("purge status"))?;
        }
        let outcome_pattern = format!("{OUTCOME_PREFIX}*");
        let outcome_keys: Vec<String> = conn
            .keys(&outcome_pattern)
            .await
            .map_err(map_err("scan outcome"))?;
        if !outcome_keys.is_empty() {
            conn.del::<_, ()>(outcome_keys)
                .await
                .map_err(map_err("purge outcome"))?;
        }
        Ok(())
    }
}
