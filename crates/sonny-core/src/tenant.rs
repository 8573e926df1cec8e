use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default provider network used to decide external reachability, unless
/// `OPENSTACK.provider_net` overrides it.
pub const DEFAULT_PROVIDER_NET: &str = "ext-net";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantAddress {
    pub addr: String,
}

/// A tenant/instance/server row, keyed by UUID, cached under `servers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub hypervisor_hostname: String,
    pub vm_state: String,
    pub addresses: HashMap<String, Vec<TenantAddress>>,
}

impl Tenant {
    /// A tenant is externally reachable iff it has at least one address on
    /// any of the configured provider networks (spec §3).
    pub fn is_externally_reachable(&self, provider_nets: &[String]) -> bool {
        provider_nets
            .iter()
            .any(|net| self.addresses.get(net).is_some_and(|a| !a.is_empty()))
    }

    /// All addresses on the configured provider networks, flattened.
    pub fn external_addrs(&self, provider_nets: &[String]) -> Vec<String> {
        provider_nets
            .iter()
            .filter_map(|net| self.addresses.get(net))
            .flatten()
            .map(|a| a.addr.clone())
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.vm_state == "stopped"
    }
}
