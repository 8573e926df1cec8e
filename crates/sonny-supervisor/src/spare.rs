use std::collections::{HashMap, HashSet};

use sonny_core::host::Host;
use sonny_core::service::Service;

/// Pick a spare host for a dead host `dead`, given the spares already
/// reserved this batch (spec §4.4.2). Candidates are drawn from
/// `services` in their given iteration order; the first one that also
/// satisfies the host-level filter wins. Ties are broken by that order.
pub fn select_spare(
    dead: &Host,
    services: &[Service],
    hosts: &[Host],
    reserved: &HashSet<String>,
) -> Option<String> {
    let hosts_by_name: HashMap<&str, &Host> = hosts.iter().map(|h| (h.name.as_str(), h)).collect();

    for service in services {
        if service.zone != dead.zone || !service.is_spare() {
            continue;
        }
        let Some(candidate) = hosts_by_name.get(service.host.as_str()) else {
            continue;
        };
        if candidate.aggregate != dead.aggregate {
            continue;
        }
        if candidate.vcpus_used != 0 {
            continue;
        }
        if candidate.vcpus < dead.vcpus {
            continue;
        }
        if reserved.contains(&service.host) {
            continue;
        }
        return Some(service.host.clone());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonny_core::host::{HostState, HostStatus};

    fn host(name: &str, zone: &str, aggregate: Option<&str>, vcpus: u32, vcpus_used: u32) -> Host {
        Host {
            name: name.to_string(),
            host_ip: "10.0.0.1".into(),
            state: HostState::Up,
            status: HostStatus::Enabled,
            running_vms: 0,
            vcpus,
            vcpus_used,
            zone: zone.to_string(),
            aggregate: aggregate.map(str::to_string),
            disabled_reason: None,
        }
    }

    fn spare_service(host: &str, zone: &str) -> Service {
        Service {
            host: host.to_string(),
            binary: "nova-compute".into(),
            state: HostState::Up,
            status: HostStatus::Disabled,
            zone: zone.to_string(),
            disables_reason: Some("spare node".into()),
        }
    }

    #[test]
    fn scenario_spare_available_is_selected() {
        let dead = host("hv42", "nova", Some("az1"), 8, 4);
        let spare = host("hv99", "nova", Some("az1"), 16, 0);
        let services = vec![spare_service("hv99", "nova")];
        let reserved = HashSet::new();

        let picked = select_spare(&dead, &services, &[dead.clone(), spare], &reserved);
        assert_eq!(picked, Some("hv99".to_string()));
    }

    #[test]
    fn scenario_two_dead_one_spare_second_pick_fails() {
        let dead1 = host("hv1", "nova", Some("az1"), 8, 0);
        let dead2 = host("hv2", "nova", Some("az1"), 8, 0);
        let spare = host("hv99", "nova", Some("az1"), 16, 0);
        let services = vec![spare_service("hv99", "nova")];

        let mut reserved = HashSet::new();
        let first = select_spare(&dead1, &services, &[dead1.clone(), dead2.clone(), spare.clone()], &reserved);
        assert_eq!(first, Some("hv99".to_string()));
        reserved.insert(first.unwrap());

        let second = select_spare(&dead2, &services, &[dead1, dead2, spare], &reserved);
        assert_eq!(second, None);
    }

    #[test]
    fn wrong_zone_is_excluded() {
        let dead = host("hv1", "nova", Some("az1"), 8, 0);
        let spare = host("hv99", "other-zone", Some("az1"), 16, 0);
        let services = vec![spare_service("hv99", "other-zone")];
        let picked = select_spare(&dead, &services, &[dead, spare], &HashSet::new());
        assert_eq!(picked, None);
    }

    #[test]
    fn insufficient_vcpus_is_excluded() {
        let dead = host("hv1", "nova", Some("az1"), 16, 0);
        let spare = host("hv99", "nova", Some("az1"), 8, 0);
        let services = vec![spare_service("hv99", "nova")];
        let picked = select_spare(&dead, &services, &[dead, spare], &HashSet::new());
        assert_eq!(picked, None);
    }

    #[test]
    fn busy_candidate_is_excluded() {
        let dead = host("hv1", "nova", Some("az1"), 8, 0);
        let spare = host("hv99", "nova", Some("az1"), 16, 2);
        let services = vec![spare_service("hv99", "nova")];
        let picked = select_spare(&dead, &services, &[dead, spare], &HashSet::new());
        assert_eq!(picked, None);
    }

    #[test]
    fn different_aggregate_is_excluded() {
        let dead = host("hv1", "nova", Some("az1"), 8, 0);
        let spare = host("hv99", "nova", Some("az2"), 16, 0);
        let services = vec![spare_service("hv99", "nova")];
        let picked = select_spare(&dead, &services, &[dead, spare], &HashSet::new());
        assert_eq!(picked, None);
    }

    #[test]
    fn first_candidate_in_iteration_order_wins_ties() {
        let dead = host("hv1", "nova", Some("az1"), 8, 0);
        let spare_a = host("hv98", "nova", Some("az1"), 16, 0);
        let spare_b = host("hv99", "nova", Some("az1"), 16, 0);
        let services = vec![spare_service("hv98", "nova"), spare_service("hv99", "nova")];
        let picked = select_spare(&dead, &services, &[dead, spare_a, spare_b], &HashSet::new());
        assert_eq!(picked, Some("hv98".to_string()));
    }
}
