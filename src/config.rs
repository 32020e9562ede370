use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Points added to the risk score per finding. Unsigned, so adding a finding
/// can never lower the score.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RiskWeights {
    pub risky_service: u32,
    pub missing_header: u32,
    pub no_security_headers: u32,
    pub tls_expired: u32,
    pub tls_near_expiry: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            risky_service: 15,
            missing_header: 5,
            no_security_headers: 15,
            tls_expired: 30,
            tls_near_expiry: 10,
        }
    }
}

/// Which port the TLS certificate check connects to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "policy", content = "port")]
pub enum TlsPortPolicy {
    /// Always this port, whichever HTTPS-capable port triggered the check.
    Fixed(u16),
    /// The lowest-numbered open port that triggered the check.
    Triggering,
}

impl Default for TlsPortPolicy {
    fn default() -> Self {
        TlsPortPolicy::Fixed(443)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub http_timeout_ms: Option<u64>,
    pub concurrency: usize,
    pub default_ports: Vec<u16>,
    pub risky_services: BTreeSet<String>,
    pub internal_networks: Vec<IpNet>,
    pub tls_port: TlsPortPolicy,
    pub screenshot_dir: PathBuf,
    pub screenshot_timeout_ms: u64,
    pub weights: RiskWeights,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 1500,
            read_timeout_ms: 500,
            http_timeout_ms: None,
            concurrency: 8,
            default_ports: vec![21, 22, 80, 443, 3306],
            risky_services: default_risky_services(),
            internal_networks: default_internal_networks(),
            tls_port: TlsPortPolicy::default(),
            screenshot_dir: PathBuf::from("screenshots"),
            screenshot_timeout_ms: 10_000,
            weights: RiskWeights::default(),
        }
    }
}

impl ScanConfig {
    /// Load a JSON config file. Missing keys fall back to defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: ScanConfig =
            serde_json::from_str(raw).map_err(|e| ScanError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ScanError::Config("concurrency must be at least 1".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ScanError::Config("connect timeout must be positive".into()));
        }
        if self.default_ports.iter().any(|&p| p == 0) {
            return Err(ScanError::Config("port 0 is not scannable".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms.unwrap_or(self.connect_timeout_ms))
    }

    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_millis(self.screenshot_timeout_ms)
    }
}

fn default_risky_services() -> BTreeSet<String> {
    [
        "ftp",
        "telnet",
        "vnc",
        "rdp",
        "mysql",
        "mssql",
        "postgresql",
        "redis",
        "mongodb",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_internal_networks() -> Vec<IpNet> {
    // loopback, RFC1918, link-local, IPv6 unique-local
    [
        "127.0.0.0/8",
        "::1/128",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
        "fe80::/10",
        "fc00::/7",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ScanConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.internal_networks.len(), 8);
        assert!(cfg.risky_services.contains("telnet"));
        assert_eq!(cfg.http_timeout(), cfg.connect_timeout());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ScanConfig::from_json(
            r#"{ "concurrency": 32, "weights": { "tls_expired": 50 }, "tls_port": { "policy": "triggering" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.concurrency, 32);
        assert_eq!(cfg.weights.tls_expired, 50);
        assert_eq!(cfg.weights.missing_header, 5);
        assert_eq!(cfg.tls_port, TlsPortPolicy::Triggering);
        assert_eq!(cfg.default_ports, vec![21, 22, 80, 443, 3306]);
    }

    #[test]
    fn fixed_tls_port_parses() {
        let cfg = ScanConfig::from_json(r#"{ "tls_port": { "policy": "fixed", "port": 8443 } }"#)
            .unwrap();
        assert_eq!(cfg.tls_port, TlsPortPolicy::Fixed(8443));
    }

    #[test]
    fn zero_concurrency_rejected() {
        assert!(ScanConfig::from_json(r#"{ "concurrency": 0 }"#).is_err());
    }
}
