use std::net::IpAddr;

use ipnet::IpNet;

/// Whether an address falls inside the networks treated as safe to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exposure {
    Internal,
    External,
}

/// Classifies resolved target addresses against a list of internal networks.
#[derive(Debug, Clone)]
pub struct ScopeGuard {
    internal: Vec<IpNet>,
}

impl ScopeGuard {
    pub fn new(internal: Vec<IpNet>) -> Self {
        Self { internal }
    }

    /// Loopback is always internal, even with an empty network list.
    pub fn classify(&self, addr: IpAddr) -> Exposure {
        let addr = canonical(addr);
        if addr.is_loopback() || self.internal.iter().any(|net| net.contains(&addr)) {
            Exposure::Internal
        } else {
            Exposure::External
        }
    }

    /// True when the scan may proceed without touching the network first.
    pub fn permits(&self, addr: IpAddr, allow_external: bool) -> bool {
        allow_external || self.classify(addr) == Exposure::Internal
    }
}

/// Map IPv4-mapped IPv6 addresses (`::ffff:10.0.0.1`) back to IPv4.
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
