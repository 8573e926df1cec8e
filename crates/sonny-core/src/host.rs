use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Enabled,
    Disabled,
}

/// A hypervisor row, as reported by the cloud control plane and cached
/// under the `hypervisors` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub host_ip: String,
    pub state: HostState,
    pub status: HostStatus,
    pub running_vms: u32,
    pub vcpus: u32,
    pub vcpus_used: u32,
    pub zone: String,
    pub aggregate: Option<String>,
    pub disabled_reason: Option<String>,
}

impl Host {
    /// A host is eligible to be named `spare` iff it is idle: `running_vms`
    /// and `vcpus_used` are both zero at the instant of selection (spec §3).
    pub fn is_idle(&self) -> bool {
        self.running_vms == 0 && self.vcpus_used == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(running_vms: u32, vcpus_used: u32) -> Host {
        Host {
            name: "hv1".into(),
            host_ip: "10.0.0.1".into(),
            state: HostState::Up,
            status: HostStatus::Enabled,
            running_vms,
            vcpus: 16,
            vcpus_used,
            zone: "nova".into(),
            aggregate: None,
            disabled_reason: None,
        }
    }

    #[test]
    fn idle_requires_zero_vms_and_zero_vcpus() {
        assert!(host(0, 0).is_idle());
        assert!(!host(1, 0).is_idle());
        assert!(!host(0, 1).is_idle());
    }

    #[test]
    fn serde_roundtrip() {
        let h = host(3, 6);
        let json = serde_json::to_string(&h).unwrap();
        let back: Host = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
