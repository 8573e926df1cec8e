use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use sonny_cache::{InventorySnapshot, JobQueue};
use sonny_cloud::CloudApi;
use sonny_core::host::Host;
use sonny_core::job::{JobRequest, JobStatus};
use sonny_core::{Result, SonnyError};
use sonny_placement::PlacementDb;
use sonny_probe::{ProbeTarget, Prober};
use tracing::{info, warn};

use crate::refresher::InventoryRefresher;
use crate::spare::select_spare;

const DEAD_HOST_PORTS: [u16; 3] = [22, 111, 16509];

/// Executes one dead→spare transplant end-to-end (spec §4.5). Preconditions
/// 1-6 are checked before any mutation; a failed precondition raises
/// [`SonnyError::PreconditionViolation`] with zero side effects.
pub struct Resurrector {
    cloud: Arc<dyn CloudApi>,
    placement: Arc<dyn PlacementDb>,
    prober: Arc<Prober>,
    snapshot: Arc<InventorySnapshot>,
    refresher: Arc<InventoryRefresher>,
}

impl Resurrector {
    pub fn new(
        cloud: Arc<dyn CloudApi>,
        placement: Arc<dyn PlacementDb>,
        prober: Arc<Prober>,
        snapshot: Arc<InventorySnapshot>,
        refresher: Arc<InventoryRefresher>,
    ) -> Self {
        Self {
            cloud,
            placement,
            prober,
            snapshot,
            refresher,
        }
    }

    pub async fn resurrect(
        &self,
        dead_host: &str,
        spare_host: &str,
        refresh_first: bool,
    ) -> Result<()> {
        if dead_host == spare_host {
            return Err(SonnyError::PreconditionViolation(
                "dead_host and spare_host are the same".into(),
            ));
        }

        if refresh_first {
            self.refresher.refresh(true).await?;
        }

        let services = self.snapshot.services().await?;
        let dead_service = services
            .iter()
            .find(|s| s.host == dead_host)
            .ok_or_else(|| {
                SonnyError::PreconditionViolation(format!("no service row for {dead_host}"))
            })?;
        let spare_service = services
            .iter()
            .find(|s| s.host == spare_host)
            .ok_or_else(|| {
                SonnyError::PreconditionViolation(format!("no service row for {spare_host}"))
            })?;
        if spare_service.status != sonny_core::host::HostStatus::Disabled {
            return Err(SonnyError::PreconditionViolation(format!(
                "{spare_host} is not disabled"
            )));
        }
        if spare_service.state != sonny_core::host::HostState::Up {
            return Err(SonnyError::PreconditionViolation(format!(
                "{spare_host} service is not up"
            )));
        }
        if spare_service.zone != dead_service.zone {
            return Err(SonnyError::PreconditionViolation(
                "spare and dead host zones differ".into(),
            ));
        }
        if !spare_service.is_spare() {
            return Err(SonnyError::PreconditionViolation(format!(
                "{spare_host} is not marked spare"
            )));
        }

        let hosts = self.snapshot.hosts().await?;
        let spare_record = hosts
            .iter()
            .find(|h| h.name == spare_host)
            .ok_or_else(|| {
                SonnyError::PreconditionViolation(format!("no hypervisor row for {spare_host}"))
            })?;
        if !spare_record.is_idle() {
            return Err(SonnyError::PreconditionViolation(format!(
                "{spare_host} still carries running vms"
            )));
        }

        let dead_record = hosts.iter().find(|h| h.name == dead_host).ok_or_else(|| {
            SonnyError::PreconditionViolation(format!("no hypervisor row for {dead_host}"))
        })?;
        let target = ProbeTarget {
            name: dead_host.to_string(),
            ip: dead_record
                .host_ip
                .parse()
                .map_err(|_| SonnyError::PreconditionViolation("bad dead host ip".into()))?,
        };
        let unreachable = self
            .prober
            .probe(&[target], &DEAD_HOST_PORTS)
            .await
            .map_err(|e| SonnyError::PreconditionViolation(format!("probe failed: {e}")))?;
        if !unreachable.contains(dead_host) {
            return Err(SonnyError::PreconditionViolation(format!(
                "{dead_host} responded to at least one port, not actually dead"
            )));
        }

        let servers = self.snapshot.servers().await?;
        if servers
            .iter()
            .any(|t| t.hypervisor_hostname == spare_host)
        {
            return Err(SonnyError::PreconditionViolation(format!(
                "a tenant already maps to {spare_host}"
            )));
        }
        let mut instances: Vec<_> = servers
            .iter()
            .filter(|t| t.hypervisor_hostname == dead_host)
            .cloned()
            .collect();
        if instances.is_empty() {
            return Ok(());
        }

        // a. Placement rewrite, one transaction, commit once.
        let ids: Vec<String> = instances.iter().map(|t| t.id.clone()).collect();
        self.placement.move_tenants(&ids, spare_host).await?;

        // b. Cache update: patch the moved tenants and write back.
        let mut all_servers = servers;
        for tenant in &mut all_servers {
            if tenant.hypervisor_hostname == dead_host {
                tenant.hypervisor_hostname = spare_host.to_string();
            }
        }
        self.snapshot.set_servers(&all_servers).await?;
        for tenant in &mut instances {
            tenant.hypervisor_hostname = spare_host.to_string();
        }

        // c. Per-tenant reconciliation: reboot (unless stopped) and rebind
        // every network port. Every tenant is attempted; errors aggregate.
        let mut errors = Vec::new();
        for tenant in &instances {
            if !tenant.is_stopped() {
                if let Err(e) = self.cloud.reboot_server_hard(&tenant.id).await {
                    errors.push(format!("reboot {}: {e}", tenant.id));
                }
            }
            match self.cloud.list_server_interfaces(&tenant.id).await {
                Ok(interfaces) => {
                    for iface in interfaces {
                        match self.cloud.get_port(&iface.port_id).await {
                            Ok(Some(_)) => {
                                if let Err(e) = self
                                    .cloud
                                    .update_port_binding(&iface.port_id, spare_host)
                                    .await
                                {
                                    errors.push(format!("rebind {}: {e}", iface.port_id));
                                }
                            }
                            Ok(None) => {
                                // Missing port is tolerated.
                            }
                            Err(e) => errors.push(format!("get_port {}: {e}", iface.port_id)),
                        }
                    }
                }
                Err(e) => errors.push(format!("list_interfaces {}: {e}", tenant.id)),
            }
        }
        if !errors.is_empty() {
            return Err(SonnyError::PartialResurrection(
                errors.len(),
                instances.len(),
                errors,
            ));
        }

        // d. Service toggle.
        self.cloud
            .disable_service(
                dead_host,
                &dead_service.binary,
                &format!("sonny resurrection on {spare_host}"),
            )
            .await?;
        self.cloud
            .enable_service(spare_host, &spare_service.binary)
            .await?;

        Ok(())
    }
}

/// One batch of dead-host resurrection (spec §4.4.3): spare selection,
/// cooldown/back-off enforcement, job dispatch, and polling jobs to their
/// terminal state. Cooldown is stamped at dispatch, not success, so
/// in-flight jobs can't be re-triggered by a concurrent tick.
pub async fn orchestrate_resurrection(
    dead: &[String],
    hosts: &[Host],
    services: &[sonny_core::service::Service],
    snapshot: &InventorySnapshot,
    queue: &dyn JobQueue,
    dead_backoff: u32,
    cooldown_period_secs: i64,
    now_epoch: i64,
) -> Result<(u32, u32)> {
    if dead.len() as u32 > dead_backoff {
        if dead_backoff == 0 {
            info!(count = dead.len(), "dry mode: resurrection suppressed");
        } else {
            info!(count = dead.len(), dead_backoff, "dead limit exceeded");
        }
        return Ok((0, 0));
    }

    if let Some(last) = snapshot.resurrection_timestamp().await? {
        if now_epoch - last < cooldown_period_secs {
            info!("resurrection cooldown in effect");
            return Ok((0, 0));
        }
    }

    let hosts_by_name: HashMap<&str, &Host> = hosts.iter().map(|h| (h.name.as_str(), h)).collect();
    let mut reserved = HashSet::new();
    let mut assignments = Vec::with_capacity(dead.len());

    for d in dead {
        let Some(dead_host) = hosts_by_name.get(d.as_str()) else {
            warn!(host = d, "dead host missing from inventory, aborting batch");
            return Ok((0, 0));
        };
        match select_spare(dead_host, services, hosts, &reserved) {
            Some(spare) => {
                reserved.insert(spare.clone());
                assignments.push((d.clone(), spare));
            }
            None => {
                warn!(host = d, "no spare available, aborting whole batch");
                return Ok((0, 0));
            }
        }
    }

    let mut pending = Vec::with_capacity(assignments.len());
    for (dead_host, spare_host) in assignments {
        let id = queue
            .enqueue(JobRequest::Resurrect {
                dead_host,
                spare_host,
                refresh_first: true,
            })
            .await?;
        pending.push(id);
    }

    snapshot.set_resurrection_timestamp(now_epoch).await?;

    let mut success = 0u32;
    let mut failure = 0u32;
    while !pending.is_empty() {
        let mut still_pending = Vec::new();
        for id in pending {
            match queue.status(&id).await? {
                Some(JobStatus::Finished) => success += 1,
                Some(JobStatus::Failed) => failure += 1,
                _ => still_pending.push(id),
            }
        }
        pending = still_pending;
        if !pending.is_empty() {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    Ok((success, failure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonny_cache::FakeJobQueue;
    use sonny_core::host::{HostState, HostStatus};
    use sonny_core::service::Service;

    fn host(name: &str, vcpus: u32, vcpus_used: u32) -> Host {
        Host {
            name: name.to_string(),
            host_ip: "10.0.0.1".into(),
            state: HostState::Up,
            status: HostStatus::Enabled,
            running_vms: 0,
            vcpus,
            vcpus_used,
            zone: "nova".into(),
            aggregate: Some("az1".into()),
            disabled_reason: None,
        }
    }

    fn spare_service(host: &str) -> Service {
        Service {
            host: host.to_string(),
            binary: "nova-compute".into(),
            state: HostState::Up,
            status: HostStatus::Disabled,
            zone: "nova".into(),
            disables_reason: Some("spare node".into()),
        }
    }

    fn make_snapshot() -> Arc<InventorySnapshot> {
        use async_trait::async_trait;
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

        Arc::new(InventorySnapshot::new(Arc::new(MemCache::default())))
    }

    #[tokio::test]
    async fn dead_limit_suppresses_resurrection() {
        let snap = make_snapshot();
        let queue = FakeJobQueue::new();
        let dead = vec!["hv1".to_string(), "hv2".to_string()];
        let hosts = vec![host("hv1", 8, 0), host("hv2", 8, 0)];
        let services = vec![];
        let (s, f) = orchestrate_resurrection(&dead, &hosts, &services, &snap, &queue, 1, 86_400, 1_000)
            .await
            .unwrap();
        assert_eq!((s, f), (0, 0));
        assert!(snap.resurrection_timestamp().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cooldown_suppresses_resurrection() {
        let snap = make_snapshot();
        snap.set_resurrection_timestamp(1_000).await.unwrap();
        let queue = FakeJobQueue::new();
        let dead = vec!["hv1".to_string()];
        let hosts = vec![host("hv1", 8, 0), host("hv99", 16, 0)];
        let services = vec![spare_service("hv99")];
        let (s, f) = orchestrate_resurrection(&dead, &hosts, &services, &snap, &queue, 1, 86_400, 1_050)
            .await
            .unwrap();
        assert_eq!((s, f), (0, 0));
        assert_eq!(snap.resurrection_timestamp().await.unwrap(), Some(1_000));
    }

    #[tokio::test]
    async fn two_dead_one_spare_aborts_whole_batch() {
        let snap = make_snapshot();
        let queue = FakeJobQueue::new();
        let dead = vec!["hv1".to_string(), "hv2".to_string()];
        let hosts = vec![host("hv1", 8, 0), host("hv2", 8, 0), host("hv99", 16, 0)];
        let services = vec![spare_service("hv99")];
        let (s, f) = orchestrate_resurrection(&dead, &hosts, &services, &snap, &queue, 2, 86_400, 1_000)
            .await
            .unwrap();
        assert_eq!((s, f), (0, 0));
        assert!(snap.resurrection_timestamp().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn single_dead_with_spare_enqueues_and_resolves() {
        let snap = make_snapshot();
        let queue = FakeJobQueue::new();
        let dead = vec!["hv1".to_string()];
        let hosts = vec![host("hv1", 8, 0), host("hv99", 16, 0)];
        let services = vec![spare_service("hv99")];

        // Drive the fake queue's single job straight to Finished, as a
        // worker executing the Resurrect job would.
        let queue = Arc::new(queue);
        let queue_clone = queue.clone();
        let worker = tokio::spawn(async move {
            loop {
                if let Some(env) = queue_clone.dequeue(0).await.unwrap() {
                    queue_clone
                        .finish(&env.id, sonny_core::job::JobOutcome::Resurrected)
                        .await
                        .unwrap();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let (s, f) = orchestrate_resurrection(&dead, &hosts, &services, &snap, queue.as_ref(), 1, 86_400, 1_000)
            .await
            .unwrap();
        worker.await.unwrap();
        assert_eq!((s, f), (1, 0));
        assert_eq!(snap.resurrection_timestamp().await.unwrap(), Some(1_000));
    }
}
