use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sonny_core::aggregate::Aggregate;
use sonny_core::agent::AgentHeartbeat;
use sonny_core::host::Host;
use sonny_core::service::Service;
use sonny_core::tenant::Tenant;
use sonny_core::{Result, SonnyError};

use crate::{CloudApi, Interface, Port, Project};

/// Minimal REST client against an OpenStack-compute-shaped JSON API.
/// Enough surface to satisfy the [`CloudApi`] contract; not a general
/// OpenStack SDK.
pub struct HttpCloudClient {
    base_url: String,
    client: Client,
}

impl HttpCloudClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SonnyError::CloudApi(format!("GET {url}: {e}")))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| SonnyError::CloudApi(format!("GET {url}: {e}")))?;
        resp.json::<T>()
            .await
            .map_err(|e| SonnyError::CloudApi(format!("GET {url} body: {e}")))
    }

    async fn post_empty(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SonnyError::CloudApi(format!("POST {url}: {e}")))?
            .error_for_status()
            .map_err(|e| SonnyError::CloudApi(format!("POST {url}: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl CloudApi for HttpCloudClient {
    async fn list_hypervisors(&self) -> Result<Vec<Host>> {
        self.get_json("/os-hypervisors/detail").await
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        self.get_json("/os-services").await
    }

    async fn list_agents(&self) -> Result<Vec<AgentHeartbeat>> {
        self.get_json("/os-agents").await
    }

    async fn list_aggregates(&self) -> Result<Vec<Aggregate>> {
        self.get_json("/os-aggregates").await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.get_json("/projects").await
    }

    async fn list_servers(&self) -> Result<Vec<Tenant>> {
        self.get_json("/servers/detail?all_tenants=true").await
    }

    async fn reboot_server_hard(&self, server_id: &str) -> Result<()> {
        self.post_empty(
            &format!("/servers/{server_id}/action"),
            &serde_json::json!({"reboot": {"type": "HARD"}}),
        )
        .await
    }

    async fn list_server_interfaces(&self, server_id: &str) -> Result<Vec<Interface>> {
        self.get_json(&format!("/servers/{server_id}/os-interface"))
            .await
    }

    async fn get_port(&self, port_id: &str) -> Result<Option<Port>> {
        match self.get_json(&format!("/ports/{port_id}")).await {
            Ok(port) => Ok(Some(port)),
            Err(SonnyError::CloudApi(msg)) if msg.contains("404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_port_binding(&self, port_id: &str, host_id: &str) -> Result<()> {
        self.post_empty(
            &format!("/ports/{port_id}"),
            &serde_json::json!({"port": {"binding:host_id": host_id}}),
        )
        .await
    }

    async fn disable_service(&self, host: &str, binary: &str, reason: &str) -> Result<()> {
        self.post_empty(
            "/os-services/disable-log-reason",
            &serde_json::json!({"host": host, "binary": binary, "disabled_reason": reason}),
        )
        .await
    }

    async fn enable_service(&self, host: &str, binary: &str) -> Result<()> {
        self.post_empty(
            "/os-services/enable",
            &serde_json::json!({"host": host, "binary": binary}),
        )
        .await
    }
}
