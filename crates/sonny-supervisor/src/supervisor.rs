use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sonny_cache::{wait_for_job, InventorySnapshot, JobQueue};
use sonny_core::config::DefaultConfig;
use sonny_core::job::{JobContext, JobOutcome, JobRequest};
use sonny_core::Result;
use tracing::{info, warn};

use crate::refresher::InventoryRefresher;
use crate::resurrection::orchestrate_resurrection;
use crate::suspicion::get_suspicious_hypervisors;

const HOST_PROBE_PORTS: [u16; 3] = [22, 111, 16509];
const TENANT_PROBE_PORTS: [u16; 1] = [22];
const REFRESH_TIMEOUT_SECS: u64 = 90;
const HOST_PROBE_TIMEOUT_SECS: u64 = 60;
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The periodic control loop (spec §4.4). One logical tick at a time; the
/// period floor applies to tick *start*, not completion — a slow tick
/// runs the next one immediately rather than drifting the schedule.
pub struct Supervisor {
    snapshot: Arc<InventorySnapshot>,
    queue: Arc<dyn JobQueue>,
    refresher: Arc<InventoryRefresher>,
    config: DefaultConfig,
}

impl Supervisor {
    pub fn new(
        snapshot: Arc<InventorySnapshot>,
        queue: Arc<dyn JobQueue>,
        refresher: Arc<InventoryRefresher>,
        config: DefaultConfig,
    ) -> Self {
        Self {
            snapshot,
            queue,
            refresher,
            config,
        }
    }

    /// Run forever, sleeping out the remainder of each tick's period.
    pub async fn run(&self) -> Result<()> {
        self.queue.purge_all().await?;
        loop {
            let started = tokio::time::Instant::now();
            if let Err(e) = self.tick().await {
                warn!(error = %e, "tick failed, continuing");
            }
            let elapsed = started.elapsed();
            let period = Duration::from_secs(self.config.monitor_period);
            if elapsed < period {
                tokio::time::sleep(period - elapsed).await;
            }
        }
    }

    /// One iteration of the algorithm in spec §4.4, steps 1-9 (step 10's
    /// sleep lives in [`Supervisor::run`] so this is independently
    /// testable).
    pub async fn tick(&self) -> Result<()> {
        // 1-2. Refresh and confirm the cloud API is alive.
        let include_tenants = self.refresher.should_include_tenants().await?;
        if !self
            .run_job(
                JobRequest::Refresh { include_tenants },
                REFRESH_TIMEOUT_SECS,
            )
            .await?
        {
            info!("refresh did not complete in time");
            return Ok(());
        }
        if !self.snapshot.api_alive().await? {
            info!("cloud api not alive, skipping tick");
            return Ok(());
        }

        // 3-4. Suspicion detection + back-off.
        let hosts = self.snapshot.hosts().await?;
        let agents = self.snapshot.agents().await?;
        let suspicious = get_suspicious_hypervisors(
            &hosts,
            &agents,
            Utc::now(),
            self.config.heartbeat_period as i64,
        );
        if suspicious.is_empty() {
            return Ok(());
        }
        if suspicious.len() as u32 > self.config.suspicious_backoff {
            info!(count = suspicious.len(), "suspicious back-off exceeded");
            return Ok(());
        }

        // 5. Host-level probe, across every suspicious host at once.
        let (done, outcome) = self
            .run_job_with_outcome(
                JobRequest::Probe {
                    context: JobContext {
                        host: None,
                        addresses: suspicious.clone(),
                        ports: HOST_PROBE_PORTS.to_vec(),
                    },
                },
                HOST_PROBE_TIMEOUT_SECS,
            )
            .await?;
        let unreachable: Vec<String> = match (done, outcome) {
            (true, Some(JobOutcome::Unreachable { addresses })) => addresses,
            // Probe failure or timeout is inconclusive: no unreachable,
            // no action (spec §7, ProbeError host-probe semantics).
            _ => Vec::new(),
        };
        if unreachable.is_empty() {
            return Ok(());
        }

        // 6. Re-refresh with tenants before reading servers.
        let _ = self
            .run_job(
                JobRequest::Refresh {
                    include_tenants: true,
                },
                REFRESH_TIMEOUT_SECS,
            )
            .await?;

        // 7-8. Per-host tenant probes and dead/alive partition.
        let servers = self.snapshot.servers().await?;
        let provider_nets = vec![sonny_core::tenant::DEFAULT_PROVIDER_NET.to_string()];
        let mut dead = Vec::new();

        for host in &unreachable {
            let tenant_ips: Vec<String> = servers
                .iter()
                .filter(|t| &t.hypervisor_hostname == host)
                .flat_map(|t| t.external_addrs(&provider_nets))
                .collect();

            if tenant_ips.is_empty() {
                // No externally-reachable tenants: nothing to verify,
                // treat as alive.
                continue;
            }

            let (done, outcome) = self
                .run_job_with_outcome(
                    JobRequest::Probe {
                        context: JobContext::probe(
                            host.clone(),
                            tenant_ips.clone(),
                            TENANT_PROBE_PORTS.to_vec(),
                        ),
                    },
                    HOST_PROBE_TIMEOUT_SECS,
                )
                .await?;

            let is_dead = match (done, outcome) {
                (true, Some(JobOutcome::Unreachable { addresses })) => {
                    tenant_ips.iter().all(|ip| addresses.contains(ip))
                }
                // Probe failure ⇒ alive-but-isolated (spec §4.4 step 8).
                _ => false,
            };

            if is_dead {
                dead.push(host.clone());
            }
        }

        // 9. Resurrection orchestration.
        if !dead.is_empty() {
            let services = self.snapshot.services().await?;
            let (success, failure) = orchestrate_resurrection(
                &dead,
                &hosts,
                &services,
                &self.snapshot,
                self.queue.as_ref(),
                self.config.dead_backoff,
                self.config.cooldown_period as i64,
                sonny_core::time::now_epoch_secs(),
            )
            .await?;
            info!(success, failure, "resurrection batch complete");
        }

        Ok(())
    }

    async fn run_job(&self, request: JobRequest, timeout_secs: u64) -> Result<bool> {
        let id = self.queue.enqueue(request).await?;
        wait_for_job(self.queue.as_ref(), &id, timeout_secs, JOB_POLL_INTERVAL).await
    }

    async fn run_job_with_outcome(
        &self,
        request: JobRequest,
        timeout_secs: u64,
    ) -> Result<(bool, Option<JobOutcome>)> {
        let id = self.queue.enqueue(request).await?;
        let done = wait_for_job(self.queue.as_ref(), &id, timeout_secs, JOB_POLL_INTERVAL).await?;
        if !done {
            return Ok((false, None));
        }
        let outcome = self.queue.outcome(&id).await?;
        Ok((true, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sonny_cache::FakeJobQueue;
    use sonny_core::host::{HostState, HostStatus};
    use std::collections::HashMap as StdMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemCache {
        values: Mutex<StdMap<String, String>>,
    }

    #[async_trait]
    impl sonny_cache::InventoryCache for MemCache {
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

    fn snapshot() -> Arc<InventorySnapshot> {
        Arc::new(InventorySnapshot::new(Arc::new(MemCache::default())))
    }

    /// Drive every queued job straight to Finished with a given outcome
    /// supplier, simulating a worker process without running one.
    async fn auto_finish(queue: Arc<FakeJobQueue>, outcome: impl Fn(&JobRequest) -> JobOutcome + Send + 'static) {
        tokio::spawn(async move {
            loop {
                if let Some(env) = queue.dequeue(0).await.unwrap() {
                    let o = outcome(&env.request);
                    queue.finish(&env.id, o).await.unwrap();
                } else {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        });
    }

    #[tokio::test]
    async fn scenario_all_heartbeats_fresh_no_probe_enqueued() {
        let snap = snapshot();
        snap.set_hosts(&[Host {
            name: "hv42".into(),
            host_ip: "10.0.0.1".into(),
            state: HostState::Up,
            status: HostStatus::Enabled,
            running_vms: 3,
            vcpus: 8,
            vcpus_used: 2,
            zone: "nova".into(),
            aggregate: None,
            disabled_reason: None,
        }])
        .await
        .unwrap();
        let mut agents = sonny_core::agent::AgentTable::new();
        let mut row = StdMap::new();
        row.insert(
            "nova-compute".to_string(),
            sonny_core::time::format_heartbeat(Utc::now() - chrono::Duration::seconds(10)),
        );
        agents.insert("hv42".to_string(), row);
        snap.set_agents(&agents).await.unwrap();

        let queue = Arc::new(FakeJobQueue::new());
        auto_finish(queue.clone(), |req| match req {
            JobRequest::Refresh { .. } => JobOutcome::Refreshed,
            _ => JobOutcome::Error {
                message: "unexpected job".into(),
            },
        })
        .await;
        snap.set_api_alive(true).await.unwrap();

        let cloud = Arc::new(sonny_cloud::FakeCloudApi::new());
        let refresher = Arc::new(InventoryRefresher::new(cloud, snap.clone()));
        let supervisor = Supervisor::new(snap.clone(), queue.clone(), refresher, DefaultConfig::default());

        supervisor.tick().await.unwrap();

        // No probe job should ever have been created; only the refresh
        // job from step 1 exists, and it's already finished.
        assert!(snap.resurrection_timestamp().await.unwrap().is_none());
    }

    use sonny_core::host::Host;

    #[tokio::test]
    async fn suspicious_backoff_skips_probe() {
        let snap = snapshot();
        let hosts: Vec<Host> = (0..10)
            .map(|i| Host {
                name: format!("hv{i}"),
                host_ip: "10.0.0.1".into(),
                state: HostState::Up,
                status: HostStatus::Enabled,
                running_vms: 3,
                vcpus: 8,
                vcpus_used: 2,
                zone: "nova".into(),
                aggregate: None,
                disabled_reason: None,
            })
            .collect();
        snap.set_hosts(&hosts).await.unwrap();

        let mut agents = sonny_core::agent::AgentTable::new();
        for h in &hosts {
            let mut row = StdMap::new();
            row.insert("nova-compute".to_string(), "2000-01-01 00:00:00".to_string());
            agents.insert(h.name.clone(), row);
        }
        snap.set_agents(&agents).await.unwrap();
        snap.set_api_alive(true).await.unwrap();

        let queue = Arc::new(FakeJobQueue::new());
        auto_finish(queue.clone(), |req| match req {
            JobRequest::Refresh { .. } => JobOutcome::Refreshed,
            JobRequest::Probe { .. } => JobOutcome::Error {
                message: "should not be called".into(),
            },
            _ => JobOutcome::Error {
                message: "unexpected".into(),
            },
        })
        .await;

        let cloud = Arc::new(sonny_cloud::FakeCloudApi::new());
        let refresher = Arc::new(InventoryRefresher::new(cloud, snap.clone()));
        let mut config = DefaultConfig::default();
        config.suspicious_backoff = 5;
        let supervisor = Supervisor::new(snap.clone(), queue.clone(), refresher, config);

        supervisor.tick().await.unwrap();
        assert!(snap.resurrection_timestamp().await.unwrap().is_none());
    }
}
