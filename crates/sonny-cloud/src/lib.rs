//! The cloud control-plane contract (spec §6) and two implementations:
//! a minimal REST client against an OpenStack-compute-shaped API, and an
//! in-memory fake used by the supervisor's own test suite.

mod fake;
mod http;

pub use fake::FakeCloudApi;
pub use http::HttpCloudClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sonny_core::aggregate::Aggregate;
use sonny_core::agent::AgentHeartbeat;
use sonny_core::host::Host;
use sonny_core::service::Service;
use sonny_core::tenant::Tenant;
use sonny_core::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub port_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub binding_host_id: Option<String>,
}

/// The cloud control-plane adapter the refresher and resurrector consume.
/// A concrete backend is intentionally not load-bearing to the core
/// control loop's correctness; this crate still provides one so the
/// workspace's binaries link and run against something real.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn list_hypervisors(&self) -> Result<Vec<Host>>;
    async fn list_services(&self) -> Result<Vec<Service>>;
    async fn list_agents(&self) -> Result<Vec<AgentHeartbeat>>;
    async fn list_aggregates(&self) -> Result<Vec<Aggregate>>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn list_servers(&self) -> Result<Vec<Tenant>>;
    async fn reboot_server_hard(&self, server_id: &str) -> Result<()>;
    async fn list_server_interfaces(&self, server_id: &str) -> Result<Vec<Interface>>;
    async fn get_port(&self, port_id: &str) -> Result<Option<Port>>;
    async fn update_port_binding(&self, port_id: &str, host_id: &str) -> Result<()>;
    async fn disable_service(&self, host: &str, binary: &str, reason: &str) -> Result<()>;
    async fn enable_service(&self, host: &str, binary: &str) -> Result<()>;
}
