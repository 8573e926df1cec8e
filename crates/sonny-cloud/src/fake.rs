use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use sonny_core::aggregate::Aggregate;
use sonny_core::agent::AgentHeartbeat;
use sonny_core::host::Host;
use sonny_core::service::Service;
use sonny_core::tenant::Tenant;
use sonny_core::{Result, SonnyError};

use crate::{CloudApi, Interface, Port, Project};

/// In-memory `CloudApi` fixture for tests: pre-load the lists it should
/// return, then drive the scenario under test and inspect the recorded
/// mutation calls (reboots, port rebinds, service toggles).
#[derive(Default)]
pub struct FakeCloudApi {
    pub hypervisors: Mutex<Vec<Host>>,
    pub services: Mutex<Vec<Service>>,
    pub agents: Mutex<Vec<AgentHeartbeat>>,
    pub aggregates: Mutex<Vec<Aggregate>>,
    pub projects: Mutex<Vec<Project>>,
    pub servers: Mutex<Vec<Tenant>>,
    pub ports: Mutex<Vec<Port>>,
    /// `(server_id, port_id)` ownership pairs; `list_server_interfaces`
    /// only ever returns a server's own ports.
    pub server_ports: Mutex<Vec<(String, String)>>,

    pub rebooted: Mutex<Vec<String>>,
    pub rebound_ports: Mutex<Vec<(String, String)>>,
    pub disabled: Mutex<Vec<(String, String)>>,
    pub enabled: Mutex<Vec<(String, String)>>,

    /// Port ids on which `update_port_binding` should fail, to simulate a
    /// partial per-tenant reconciliation failure.
    pub fail_rebind: Mutex<HashSet<String>>,
}

impl FakeCloudApi {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CloudApi for FakeCloudApi {
    async fn list_hypervisors(&self) -> Result<Vec<Host>> {
        Ok(self.hypervisors.lock().unwrap().clone())
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        Ok(self.services.lock().unwrap().clone())
    }

    async fn list_agents(&self) -> Result<Vec<AgentHeartbeat>> {
        Ok(self.agents.lock().unwrap().clone())
    }

    async fn list_aggregates(&self) -> Result<Vec<Aggregate>> {
        Ok(self.aggregates.lock().unwrap().clone())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.projects.lock().unwrap().clone())
    }

    async fn list_servers(&self) -> Result<Vec<Tenant>> {
        Ok(self.servers.lock().unwrap().clone())
    }

    async fn reboot_server_hard(&self, server_id: &str) -> Result<()> {
        self.rebooted.lock().unwrap().push(server_id.to_string());
        Ok(())
    }

    async fn list_server_interfaces(&self, server_id: &str) -> Result<Vec<Interface>> {
        Ok(self
            .server_ports
            .lock()
            .unwrap()
            .iter()
            .filter(|(sid, _)| sid == server_id)
            .map(|(_, port_id)| Interface {
                port_id: port_id.clone(),
            })
            .collect())
    }

    async fn get_port(&self, port_id: &str) -> Result<Option<Port>> {
        Ok(self
            .ports
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == port_id)
            .cloned())
    }

    async fn update_port_binding(&self, port_id: &str, host_id: &str) -> Result<()> {
        if self.fail_rebind.lock().unwrap().contains(port_id) {
            return Err(SonnyError::CloudApi(format!(
                "simulated rebind failure for {port_id}"
            )));
        }
        self.rebound_ports
            .lock()
            .unwrap()
            .push((port_id.to_string(), host_id.to_string()));
        let mut ports = self.ports.lock().unwrap();
        if let Some(p) = ports.iter_mut().find(|p| p.id == port_id) {
            p.binding_host_id = Some(host_id.to_string());
        }
        Ok(())
    }

    async fn disable_service(&self, host: &str, _binary: &str, reason: &str) -> Result<()> {
        self.disabled
            .lock()
            .unwrap()
            .push((host.to_string(), reason.to_string()));
        Ok(())
    }

    async fn enable_service(&self, host: &str, _binary: &str) -> Result<()> {
        self.enabled
            .lock()
            .unwrap()
            .push((host.to_string(), String::new()));
        Ok(())
    }
}
