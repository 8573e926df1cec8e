use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use sonny_cache::InventoryCache;
use sonny_core::{Result, SonnyError};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

/// Strips a leading `@mention` from an operator command, grounded in the
/// original bot's `^<@(|[WU].+?)>(.*)`: group 1 is the mentioned user id
/// (absent when the message is a plain DM), group 2 is the rest of the
/// text. A `<id|display name>` mention form is reduced to the display
/// name before the remaining text is considered.
fn mention_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<@(|[WU].+?)>(.*)").unwrap())
}

fn piped_mention_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^|>]+\|([^>]+)>").unwrap())
}

fn strip_mention(text: &str) -> String {
    let text = match mention_regex().captures(text) {
        Some(caps) => caps.get(2).map(|m| m.as_str()).unwrap_or(text),
        None => text,
    };
    piped_mention_regex()
        .replace_all(text.trim(), "$1")
        .trim()
        .to_string()
}

/// A chat transport the bridge posts to and receives operator commands
/// from. Kept as a trait so the wiring to a specific chat service lives
/// entirely in the CLI binary.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post(&self, channel: &str, text: &str) -> Result<()>;
    async fn recv_command(&self) -> Option<(String, String)>;
}

/// Answers operator commands and relays log-derived chat messages coming
/// in over the cache's pub/sub, coalescing bursts and rate-limiting
/// outbound posts to at most one per second (spec §4.6).
pub struct ChatBridge {
    cache: Arc<dyn InventoryCache>,
    snapshots: HashMap<String, Arc<sonny_cache::InventorySnapshot>>,
    transport: Arc<dyn ChatTransport>,
    channel: String,
}

impl ChatBridge {
    pub fn new(
        cache: Arc<dyn InventoryCache>,
        snapshots: HashMap<String, Arc<sonny_cache::InventorySnapshot>>,
        transport: Arc<dyn ChatTransport>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            snapshots,
            transport,
            channel: channel.into(),
        }
    }

    fn clouds(&self) -> Vec<String> {
        self.snapshots.keys().cloned().collect()
    }

    /// Runs forever: a relay task draining the per-cloud pub/sub topics
    /// into coalesced, rate-limited posts, and a command loop answering
    /// operator queries. Reconnects the pub/sub subscription with
    /// [`sonny_core::retry::ReconnectBackoff`] if it drops.
    pub async fn run(&self) -> Result<()> {
        let relay = self.run_relay();
        let commands = self.run_commands();
        tokio::try_join!(relay, commands)?;
        Ok(())
    }

    async fn run_relay(&self) -> Result<()> {
        let mut backoff = sonny_core::retry::ReconnectBackoff::default();
        let mut reconnecting = false;
        loop {
            match self.cache.subscribe(self.clouds()).await {
                Ok(rx) => {
                    backoff.reset();
                    if reconnecting {
                        info!("sonny re-initialized");
                    }
                    self.coalesce_and_post(rx).await;
                    warn!("chat relay subscription ended, reconnecting");
                    reconnecting = true;
                }
                Err(e) => {
                    warn!(error = %e, "chat relay subscribe failed");
                    reconnecting = true;
                }
            }
            backoff.wait().await;
        }
    }

    /// Drains buffered per-cloud messages once a second; each post
    /// concatenates every currently buffered line (per cloud, in arrival
    /// order), each prefixed `"<cloud>: "`.
    async fn coalesce_and_post(&self, mut rx: mpsc::UnboundedReceiver<(String, String)>) {
        let mut buffers: HashMap<String, Vec<String>> = HashMap::new();
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some((topic, line)) => {
                            buffers.entry(topic).or_default().push(line);
                        }
                        None => return,
                    }
                }
                _ = ticker.tick() => {
                    let mut text = String::new();
                    for (cloud, lines) in buffers.iter_mut() {
                        for line in lines.drain(..) {
                            if !text.is_empty() {
                                text.push('\n');
                            }
                            text.push_str(&format!("{cloud}: {line}"));
                        }
                    }
                    if !text.is_empty() {
                        if let Err(e) = self.transport.post(&self.channel, &text).await {
                            warn!(error = %e, "failed to post coalesced chat message");
                        }
                    }
                }
            }
        }
    }

    async fn run_commands(&self) -> Result<()> {
        loop {
            match self.transport.recv_command().await {
                Some((channel, text)) => {
                    let command = strip_mention(&text);
                    let reply = self.handle_command(&command).await;
                    if let Some(reply) = reply {
                        if let Err(e) = self.transport.post(&channel, &reply).await {
                            warn!(error = %e, "failed to post command reply");
                        }
                    }
                }
                None => return Err(SonnyError::CacheUnavailable("chat transport closed".into())),
            }
        }
    }

    async fn handle_command(&self, command: &str) -> Option<String> {
        let mut parts = command.split_whitespace();
        match parts.next()? {
            "help" => Some(
                "commands: help, status, show hv <name>, show vm <uuid_or_name>".to_string(),
            ),
            "status" => Some(self.status_reply().await),
            "show" => match parts.next() {
                Some("hv") => {
                    let name = parts.next()?;
                    Some(self.show_hv_reply(name).await)
                }
                Some("vm") => {
                    let ident = parts.next()?;
                    Some(self.show_vm_reply(ident).await)
                }
                _ => Some("unknown show target, try: show hv <name> | show vm <uuid_or_name>".into()),
            },
            _ => {
                info!(%command, "unrecognized chat command");
                None
            }
        }
    }

    /// `"<cloud>: inventory updated <n> seconds ago"` for every cloud,
    /// using `api_alive:timestamp`.
    async fn status_reply(&self) -> String {
        let mut clouds: Vec<&String> = self.snapshots.keys().collect();
        clouds.sort();
        let mut lines = Vec::with_capacity(clouds.len());
        for cloud in clouds {
            let snap = &self.snapshots[cloud];
            let age = snap.age("api_alive").await.unwrap_or(None);
            match age {
                Some(secs) => lines.push(format!("{cloud}: inventory updated {secs} seconds ago")),
                None => lines.push(format!("{cloud}: inventory never updated")),
            }
        }
        lines.join("\n")
    }

    async fn show_hv_reply(&self, name: &str) -> String {
        for snap in self.snapshots.values() {
            if let Ok(hosts) = snap.hosts().await {
                if let Some(h) = hosts.into_iter().find(|h| h.name == name) {
                    return serde_yaml::to_string(&h).unwrap_or_else(|_| "not found".into());
                }
            }
        }
        "not found".to_string()
    }

    async fn show_vm_reply(&self, ident: &str) -> String {
        for snap in self.snapshots.values() {
            if let Ok(servers) = snap.servers().await {
                if let Some(t) = servers.into_iter().find(|t| t.id == ident || t.name == ident) {
                    return serde_yaml::to_string(&t).unwrap_or_else(|_| "not found".into());
                }
            }
        }
        "not found".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;

    #[test]
    fn mention_is_stripped() {
        assert_eq!(strip_mention("<@U123> status"), "status");
        assert_eq!(strip_mention("status"), "status");
        assert_eq!(strip_mention("<@>help"), "help");
    }

    #[test]
    fn piped_mention_reduces_to_display_name() {
        assert_eq!(strip_mention("show hv <U123|hv-ops>"), "show hv hv-ops");
    }

    #[derive(Default)]
    struct MemCache {
        values: Mutex<HashMap<String, String>>,
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
        async fn publish(&self, _topic: &str, _message: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeTransport {
        #[allow(dead_code)]
        posts: Mutex<Vec<(String, String)>>,
        commands: AsyncMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        async fn post(&self, channel: &str, text: &str) -> Result<()> {
            self.posts
                .lock()
                .unwrap()
                .push((channel.to_string(), text.to_string()));
            Ok(())
        }
        async fn recv_command(&self) -> Option<(String, String)> {
            self.commands.lock().await.pop()
        }
    }

    fn bridge_with(snapshots: HashMap<String, Arc<sonny_cache::InventorySnapshot>>) -> ChatBridge {
        let cache = Arc::new(MemCache::default());
        let transport = Arc::new(FakeTransport {
            posts: Mutex::new(vec![]),
            commands: AsyncMutex::new(vec![]),
        });
        ChatBridge::new(cache, snapshots, transport, "#ops".to_string())
    }

    #[tokio::test]
    async fn status_reports_never_updated_when_absent() {
        let cache = Arc::new(MemCache::default());
        let snapshot = Arc::new(sonny_cache::InventorySnapshot::new(cache));
        let mut snapshots = HashMap::new();
        snapshots.insert("mycloud".to_string(), snapshot);
        let bridge = bridge_with(snapshots);
        let reply = bridge.status_reply().await;
        assert_eq!(reply, "mycloud: inventory never updated");
    }

    #[tokio::test]
    async fn show_hv_reports_not_found() {
        let cache = Arc::new(MemCache::default());
        let snapshot = Arc::new(sonny_cache::InventorySnapshot::new(cache));
        let mut snapshots = HashMap::new();
        snapshots.insert("mycloud".to_string(), snapshot);
        let bridge = bridge_with(snapshots);
        let reply = bridge.show_hv_reply("hv-nonexistent").await;
        assert_eq!(reply, "not found");
    }

    #[tokio::test]
    async fn help_command_lists_commands() {
        let bridge = bridge_with(HashMap::new());
        let reply = bridge.handle_command("help").await.unwrap();
        assert!(reply.contains("show hv"));
    }
}
