use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A normalized scan target: bare host (no scheme, no port) plus the address it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub host: String,
    pub addr: IpAddr,
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Open,
    Closed,
    Error,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortState::Open => "open",
            PortState::Closed => "closed",
            PortState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome of probing one TCP port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub port: u16,
    pub state: PortState,
    pub banner: String,
    pub service: String,
    pub error: Option<String>,
}

impl PortResult {
    pub fn closed(port: u16, service: impl Into<String>) -> Self {
        Self {
            port,
            state: PortState::Closed,
            banner: String::new(),
            service: service.into(),
            error: None,
        }
    }

    pub fn open(port: u16, banner: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            port,
            state: PortState::Open,
            banner: banner.into(),
            service: service.into(),
            error: None,
        }
    }

    /// A probe that failed for a reason other than a refused or unreachable peer.
    pub fn fault(port: u16, message: impl Into<String>) -> Self {
        Self {
            port,
            state: PortState::Error,
            banner: String::new(),
            service: "unknown".to_string(),
            error: Some(message.into()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security header presence for one inspected (scheme, port) pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HttpHeaderResult {
    pub url: String,
    pub status_code: Option<u16>,
    pub headers_found: BTreeMap<String, String>,
    pub headers_missing: Vec<String>,
    pub error: Option<String>,
}

impl HttpHeaderResult {
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: None,
            headers_found: BTreeMap::new(),
            headers_missing: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_https(&self) -> bool {
        self.url.starts_with("https://")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TlsCertResult {
    pub issuer: BTreeMap<String, String>,
    pub subject: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expiry_timestamp: Option<OffsetDateTime>,
    pub days_until_expiry: Option<i64>,
    pub is_expired: bool,
    pub is_near_expiry: bool,
    pub error: Option<String>,
}

impl TlsCertResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotResult {
    pub url: String,
    pub file_path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// The aggregate produced by one scan run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub target: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub ports: Vec<PortResult>,
    pub http_headers: BTreeMap<String, HttpHeaderResult>,
    pub tls_cert: Option<TlsCertResult>,
    pub vulnerabilities: Vec<String>,
    pub screenshots: Vec<ScreenshotResult>,
    pub risk_score: u8,
    pub errors: Vec<String>,
    #[serde(default)]
    pub refused: bool,
    #[serde(default)]
    pub interrupted: bool,
}

impl ScanReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            timestamp: OffsetDateTime::now_utc(),
            ports: Vec::new(),
            http_headers: BTreeMap::new(),
            tls_cert: None,
            vulnerabilities: Vec::new(),
            screenshots: Vec::new(),
            risk_score: 0,
            errors: Vec::new(),
            refused: false,
            interrupted: false,
        }
    }

    /// An unscanned report for a target the safety gate rejected.
    pub fn refusal(target: impl Into<String>) -> Self {
        Self {
            refused: true,
            ..Self::new(target)
        }
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &PortResult> {
        self.ports.iter().filter(|p| p.is_open())
    }
}

/// Key under which an HTTP inspection is stored in `ScanReport::http_headers`.
pub fn http_key(scheme: Scheme, port: u16) -> String {
    format!("{}_{}", scheme, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_key_joins_scheme_and_port() {
        assert_eq!(http_key(Scheme::Https, 8443), "https_8443");
        assert_eq!(http_key(Scheme::Http, 80), "http_80");
    }

    #[test]
    fn report_serializes_snake_case_fields() {
        let mut report = ScanReport::new("127.0.0.1");
        report.ports.push(PortResult::open(22, "SSH-2.0-OpenSSH_8.9", "ssh"));
        let value = serde_json::to_value(&report).unwrap();
        for field in [
            "target",
            "timestamp",
            "ports",
            "http_headers",
            "tls_cert",
            "vulnerabilities",
            "screenshots",
            "risk_score",
            "errors",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["ports"][0]["state"], "open");
        assert!(value["tls_cert"].is_null());
    }
}
