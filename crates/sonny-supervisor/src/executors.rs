use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use sonny_cache::InventorySnapshot;
use sonny_core::host::Host;
use sonny_core::job::{JobContext, JobOutcome, JobRequest};
use sonny_probe::{ProbeTarget, Prober};

use crate::refresher::InventoryRefresher;
use crate::resurrection::Resurrector;

/// Everything a worker process (`ns4`) needs to actually perform a
/// [`JobRequest`] and produce its [`JobOutcome`]. One `Worker` per
/// process; any number may run concurrently against the shared queue.
pub struct Worker {
    pub refresher: Arc<InventoryRefresher>,
    pub prober: Arc<Prober>,
    pub snapshot: Arc<InventorySnapshot>,
    pub resurrector: Arc<Resurrector>,
}

impl Worker {
    pub async fn execute(&self, request: JobRequest) -> JobOutcome {
        match request {
            JobRequest::Refresh { include_tenants } => {
                match self.refresher.refresh(include_tenants).await {
                    Ok(()) => JobOutcome::Refreshed,
                    Err(e) => JobOutcome::Error {
                        message: e.to_string(),
                    },
                }
            }
            JobRequest::Probe { context } => self.execute_probe(context).await,
            JobRequest::Resurrect {
                dead_host,
                spare_host,
                refresh_first,
            } => match self
                .resurrector
                .resurrect(&dead_host, &spare_host, refresh_first)
                .await
            {
                Ok(()) => JobOutcome::Resurrected,
                Err(e) => JobOutcome::Error {
                    message: e.to_string(),
                },
            },
        }
    }

    async fn execute_probe(&self, context: JobContext) -> JobOutcome {
        let hosts = match self.snapshot.hosts().await {
            Ok(h) => h,
            Err(e) => {
                return JobOutcome::Error {
                    message: e.to_string(),
                }
            }
        };
        let targets = resolve_targets(&context.addresses, &hosts);
        match self.prober.probe(&targets, &context.ports).await {
            Ok(unreachable) => JobOutcome::Unreachable {
                addresses: unreachable.into_iter().collect(),
            },
            Err(e) => JobOutcome::Error {
                message: e.to_string(),
            },
        }
    }
}

/// Translate every non-IP entry through the cache (spec §4.2 step 1):
/// literal IPs pass through as their own name; host names are resolved to
/// `hypervisors[name].host_ip`.
pub fn resolve_targets(addresses: &[String], hosts: &[Host]) -> Vec<ProbeTarget> {
    let by_name: HashMap<&str, &Host> = hosts.iter().map(|h| (h.name.as_str(), h)).collect();
    addresses
        .iter()
        .filter_map(|addr| {
            if let Ok(ip) = addr.parse::<IpAddr>() {
                Some(ProbeTarget {
                    name: addr.clone(),
                    ip,
                })
            } else {
                by_name
                    .get(addr.as_str())
                    .and_then(|h| h.host_ip.parse::<IpAddr>().ok())
                    .map(|ip| ProbeTarget {
                        name: addr.clone(),
                        ip,
                    })
            }
        })
        .collect()
}
