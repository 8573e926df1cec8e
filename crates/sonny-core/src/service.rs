use serde::{Deserialize, Serialize};

use crate::host::{HostState, HostStatus};

/// A per-host service row from the cloud control plane, cached under
/// `services`. The field name `disables_reason` (not `disable_reason`) is
/// the literal key the upstream service rows use and is preserved as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub host: String,
    pub binary: String,
    pub state: HostState,
    pub status: HostStatus,
    pub zone: String,
    pub disables_reason: Option<String>,
}

impl Service {
    /// A service is a "spare" iff it is up, disabled, and its disable
    /// reason contains the case-insensitive token `spare` (spec §3).
    pub fn is_spare(&self) -> bool {
        self.state == HostState::Up
            && self.status == HostStatus::Disabled
            && self
                .disables_reason
                .as_deref()
                .is_some_and(|r| r.to_lowercase().contains("spare"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(state: HostState, status: HostStatus, reason: Option<&str>) -> Service {
        Service {
            host: "hv99".into(),
            binary: "nova-compute".into(),
            state,
            status,
            zone: "nova".into(),
            disables_reason: reason.map(str::to_string),
        }
    }

    #[test]
    fn spare_requires_up_disabled_and_reason_token() {
        assert!(service(HostState::Up, HostStatus::Disabled, Some("spare node")).is_spare());
        assert!(service(HostState::Up, HostStatus::Disabled, Some("SPARE")).is_spare());
        assert!(!service(HostState::Down, HostStatus::Disabled, Some("spare")).is_spare());
        assert!(!service(HostState::Up, HostStatus::Enabled, Some("spare")).is_spare());
        assert!(!service(HostState::Up, HostStatus::Disabled, Some("maintenance")).is_spare());
        assert!(!service(HostState::Up, HostStatus::Disabled, None).is_spare());
    }
}
