//! TCP reachability probing (spec §4.2). A thin, concurrent connect-scan:
//! for every (address, port) pair, try a short-lived TCP connect and
//! record whether *any* port on an address answered.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use sonny_core::{Result, SonnyError};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Either a bare IP literal or a name the caller has already resolved to
/// an address via the inventory cache (`hypervisors[name].host_ip`).
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub name: String,
    pub ip: IpAddr,
}

pub struct Prober;

impl Prober {
    pub fn new() -> Self {
        Self
    }

    /// Issue a single TCP connect scan across the union of `targets` and
    /// `ports`; return the subset of `targets` (by name) that did not
    /// respond on any port. A scan-tool failure surfaces as
    /// [`SonnyError::Probe`], never as "everything unreachable".
    pub async fn probe(&self, targets: &[ProbeTarget], ports: &[u16]) -> Result<HashSet<String>> {
        if targets.is_empty() {
            return Err(SonnyError::Probe("no targets given".into()));
        }
        if ports.is_empty() {
            return Err(SonnyError::Probe("no ports given".into()));
        }

        let mut responded: HashMap<IpAddr, bool> = targets.iter().map(|t| (t.ip, false)).collect();

        let mut checks = Vec::new();
        for target in targets {
            for &port in ports {
                checks.push(check_one(target.ip, port));
            }
        }
        let results = futures::future::join_all(checks).await;

        let mut idx = 0;
        for target in targets {
            for _ in ports {
                if results[idx] {
                    responded.insert(target.ip, true);
                }
                idx += 1;
            }
        }

        Ok(targets
            .iter()
            .filter(|t| !responded.get(&t.ip).copied().unwrap_or(false))
            .map(|t| t.name.clone())
            .collect())
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

async fn check_one(ip: IpAddr, port: u16) -> bool {
    let addr = SocketAddr::new(ip, port);
    let ok = matches!(
        timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    );
    debug!(%addr, responded = ok, "probe attempt");
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_counts_as_responded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let targets = vec![ProbeTarget {
            name: "hv1".into(),
            ip: "127.0.0.1".parse().unwrap(),
        }];
        let prober = Prober::new();
        let unreachable = prober.probe(&targets, &[port]).await.unwrap();
        assert!(unreachable.is_empty());
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        // Port 1 is reserved and essentially guaranteed not to accept.
        let targets = vec![ProbeTarget {
            name: "hv1".into(),
            ip: "127.0.0.1".parse().unwrap(),
        }];
        let prober = Prober::new();
        let unreachable = prober.probe(&targets, &[1]).await.unwrap();
        assert_eq!(unreachable, HashSet::from(["hv1".to_string()]));
    }

    #[tokio::test]
    async fn reachable_on_any_port_is_not_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let targets = vec![ProbeTarget {
            name: "hv1".into(),
            ip: "127.0.0.1".parse().unwrap(),
        }];
        let prober = Prober::new();
        let unreachable = prober.probe(&targets, &[1, open_port]).await.unwrap();
        assert!(unreachable.is_empty());
    }

    #[tokio::test]
    async fn empty_targets_is_probe_error() {
        let prober = Prober::new();
        let err = prober.probe(&[], &[22]).await.unwrap_err();
        assert!(matches!(err, SonnyError::Probe(_)));
    }
}
