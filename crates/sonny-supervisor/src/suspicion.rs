use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sonny_core::agent::AgentTable;
use sonny_core::host::{Host, HostState, HostStatus};
use sonny_core::time::parse_heartbeat;
use tracing::warn;

/// Pure suspicion predicate (spec §4.4.1): given a fixed inventory and a
/// fixed `now`, the result is deterministic. A single silent agent is
/// tolerated; universal silence signals host-level failure.
pub fn get_suspicious_hypervisors(
    hosts: &[Host],
    agents: &AgentTable,
    now: DateTime<Utc>,
    heartbeat_period_secs: i64,
) -> Vec<String> {
    let by_name: HashMap<&str, &Host> = hosts.iter().map(|h| (h.name.as_str(), h)).collect();
    let mut suspicious = Vec::new();

    for (host_name, timestamps) in agents {
        let Some(host) = by_name.get(host_name.as_str()) else {
            continue;
        };

        if host.state == HostState::Down
            && host
                .disabled_reason
                .as_deref()
                .is_some_and(|r| r.to_lowercase().contains("sonny"))
        {
            continue;
        }

        if host.status == HostStatus::Disabled {
            if host.running_vms == 0 {
                continue;
            }
            warn!(host = host_name, "disabled host still carries running vms");
        }

        if host.running_vms == 0 {
            continue;
        }

        let all_silent = timestamps.values().all(|t| match parse_heartbeat(t) {
            Some(ts) => (now - ts).num_seconds() > heartbeat_period_secs,
            // An unparseable timestamp is treated as silence: it cannot
            // prove the agent is alive.
            None => true,
        });

        if all_silent {
            suspicious.push(host_name.clone());
        }
    }

    suspicious
}
