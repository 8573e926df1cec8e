use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use sonny_chat::ChatTransport;
use sonny_core::{Result, SonnyError};

/// Delay between polls of the channel's history, mirroring the original
/// bot's `RTM_READ_DELAY` between `rtm_read()` calls.
const POLL_DELAY: Duration = Duration::from_secs(2);

/// Matches a direct mention at the start of a message: group 1 is the
/// mentioned user id, group 2 the remaining text.
fn mention_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<@(|[WU].+?)>(.*)").unwrap())
}

/// Returns the mentioned user id and remaining text, if `text` opens
/// with a direct mention.
fn parse_direct_mention(text: &str) -> Option<(&str, &str)> {
    let caps = mention_regex().captures(text)?;
    let user_id = caps.get(1)?.as_str();
    let rest = caps.get(2)?.as_str().trim();
    Some((user_id, rest))
}

#[derive(Deserialize)]
struct HistoryResponse {
    ok: bool,
    messages: Option<Vec<HistoryMessage>>,
    #[allow(dead_code)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct HistoryMessage {
    #[serde(default)]
    subtype: Option<String>,
    text: String,
    ts: String,
}

/// A Slack Web API transport: posts via `chat.postMessage`, and recovers
/// operator commands by polling `conversations.history` for new messages
/// since the last poll, the same cadence the original RTM-based bot used.
pub struct SlackTransport {
    client: Client,
    token: String,
    channel: String,
    self_user_id: String,
    last_ts: Mutex<Option<String>>,
}

impl SlackTransport {
    pub fn new(token: impl Into<String>, channel: impl Into<String>, self_user_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            channel: channel.into(),
            self_user_id: self_user_id.into(),
            last_ts: Mutex::new(None),
        }
    }

    /// Looks up the bot's own user id via `auth.test`, the Slack
    /// equivalent of the original's `api_call("auth.test")["user_id"]`.
    pub async fn connect(token: impl Into<String>, channel: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let client = Client::new();
        #[derive(Deserialize)]
        struct AuthTest {
            ok: bool,
            user_id: Option<String>,
            error: Option<String>,
        }
        let resp: AuthTest = client
            .post("https://slack.com/api/auth.test")
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| SonnyError::CacheUnavailable(format!("slack auth.test: {e}")))?
            .json()
            .await
            .map_err(|e| SonnyError::CacheUnavailable(format!("slack auth.test decode: {e}")))?;
        if !resp.ok {
            return Err(SonnyError::Config(format!(
                "slack auth.test failed: {}",
                resp.error.unwrap_or_default()
            )));
        }
        Ok(Self::new(token, channel, resp.user_id.unwrap_or_default()))
    }
}

#[async_trait]
impl ChatTransport for SlackTransport {
    async fn post(&self, channel: &str, text: &str) -> Result<()> {
        let resp: serde_json::Value = self
            .client
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "channel": channel, "text": text }))
            .send()
            .await
            .map_err(|e| SonnyError::CloudApi(format!("slack post: {e}")))?
            .json()
            .await
            .map_err(|e| SonnyError::CloudApi(format!("slack post decode: {e}")))?;
        if resp.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(SonnyError::CloudApi(format!("slack post rejected: {resp}")));
        }
        Ok(())
    }

    async fn recv_command(&self) -> Option<(String, String)> {
        loop {
            tokio::time::sleep(POLL_DELAY).await;
            let oldest = self.last_ts.lock().unwrap().clone();
            let mut req = self
                .client
                .get("https://slack.com/api/conversations.history")
                .bearer_auth(&self.token)
                .query(&[("channel", self.channel.as_str()), ("limit", "20")]);
            if let Some(ts) = &oldest {
                req = req.query(&[("oldest", ts.as_str())]);
            }
            let resp = match req.send().await {
                Ok(r) => r,
                Err(_) => continue,
            };
            let history: HistoryResponse = match resp.json().await {
                Ok(h) => h,
                Err(_) => continue,
            };
            if !history.ok {
                continue;
            }
            let Some(messages) = history.messages else {
                continue;
            };
            // Slack returns newest-first; walk oldest-to-newest so
            // `last_ts` always advances monotonically.
            for msg in messages.into_iter().rev() {
                *self.last_ts.lock().unwrap() = Some(msg.ts.clone());
                if msg.subtype.is_some() {
                    continue;
                }
                let Some((user_id, rest)) = parse_direct_mention(&msg.text) else {
                    continue;
                };
                if user_id != self.self_user_id {
                    continue;
                }
                return Some((self.channel.clone(), rest.to_string()));
            }
        }
    }
}
