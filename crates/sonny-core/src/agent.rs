use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-host, per-binary last-heartbeat timestamps, keyed exactly as the
/// cache stores them: `host_name -> agent_binary -> "YYYY-MM-DD HH:MM:SS"`.
pub type AgentTable = HashMap<String, HashMap<String, String>>;

/// A single heartbeat row as the cloud adapter reports it, before it is
/// folded into an [`AgentTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHeartbeat {
    pub host: String,
    pub binary: String,
    pub last_heartbeat_at: String,
}

/// Fold a flat list of heartbeat rows into the nested table shape the
/// cache and the suspicion predicate expect.
pub fn build_agent_table(rows: impl IntoIterator<Item = AgentHeartbeat>) -> AgentTable {
    let mut table: AgentTable = HashMap::new();
    for row in rows {
        table
            .entry(row.host)
            .or_default()
            .insert(row.binary, row.last_heartbeat_at);
    }
    table
}
