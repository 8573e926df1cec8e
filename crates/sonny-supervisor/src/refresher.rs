use std::sync::Arc;

use sonny_cache::InventorySnapshot;
use sonny_cloud::CloudApi;
use sonny_core::agent::build_agent_table;
use sonny_core::Result;
use tracing::warn;

/// Reloads inventory from the cloud adapter into the cache (spec §4.3).
/// Runs sub-fetches in a fixed order: tenants (optional), hosts, projects,
/// agents, services, aggregates. Each overwrites its key and `:timestamp`
/// sibling. On any error, `api_alive` is set false and the error is
/// re-raised — the job fails; on success `api_alive` is set true.
pub struct InventoryRefresher {
    cloud: Arc<dyn CloudApi>,
    snapshot: Arc<InventorySnapshot>,
}

impl InventoryRefresher {
    pub fn new(cloud: Arc<dyn CloudApi>, snapshot: Arc<InventorySnapshot>) -> Self {
        Self { cloud, snapshot }
    }

    /// The Supervisor's single freshness heuristic: fetch tenants only
    /// when the `servers` key is missing or stale (spec §4.3).
    pub async fn should_include_tenants(&self) -> Result<bool> {
        match self.snapshot.age("servers").await? {
            None => Ok(true),
            Some(age) => Ok(age > 600),
        }
    }

    pub async fn refresh(&self, include_tenants: bool) -> Result<()> {
        match self.refresh_inner(include_tenants).await {
            Ok(()) => {
                self.snapshot.set_api_alive(true).await?;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "refresh failed, marking api dead");
                // Best-effort: if even this write fails, propagate the
                // original error, not the write failure.
                let _ = self.snapshot.set_api_alive(false).await;
                Err(e)
            }
        }
    }

    async fn refresh_inner(&self, include_tenants: bool) -> Result<()> {
        if include_tenants {
            let tenants = self.cloud.list_servers().await?;
            self.snapshot.set_servers(&tenants).await?;
        }

        let hosts = self.cloud.list_hypervisors().await?;
        self.snapshot.set_hosts(&hosts).await?;

        let projects = self.cloud.list_projects().await?;
        self.snapshot.set_projects(&projects).await?;

        let agent_rows = self.cloud.list_agents().await?;
        let table = build_agent_table(agent_rows);
        self.snapshot.set_agents(&table).await?;

        let services = self.cloud.list_services().await?;
        self.snapshot.set_services(&services).await?;

        let aggregates = self.cloud.list_aggregates().await?;
        self.snapshot.set_aggregates(&aggregates).await?;

        Ok(())
    }
}
