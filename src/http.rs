use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::redirect;
use tracing::{debug, info, warn};

use crate::types::{HttpHeaderResult, Scheme, ScanTarget};

pub const HSTS: &str = "Strict-Transport-Security";

/// Response headers whose absence the analyzer reports, in report order.
pub const SECURITY_HEADERS: [&str; 6] = [
    "Content-Security-Policy",
    "X-Frame-Options",
    "X-Content-Type-Options",
    HSTS,
    "Referrer-Policy",
    "Permissions-Policy",
];

#[async_trait]
pub trait HeaderInspector: Send + Sync {
    /// One GET against `scheme://host:port`. Transport faults land in `error`.
    async fn inspect(&self, target: &ScanTarget, port: u16, scheme: Scheme) -> HttpHeaderResult;
}

pub fn build_url(target: &ScanTarget, port: u16, scheme: Scheme) -> String {
    if target.host.contains(':') {
        format!("{}://[{}]:{}", scheme, target.host, port)
    } else {
        format!("{}://{}:{}", scheme, target.host, port)
    }
}

/// Split the fixed header set into found (with value) and missing.
///
/// HSTS only counts as present over HTTPS; on plain HTTP it is always listed missing.
pub fn classify_headers(
    headers: &HeaderMap,
    scheme: Scheme,
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut found = BTreeMap::new();
    let mut missing = Vec::new();
    for name in SECURITY_HEADERS {
        let value = if name == HSTS && scheme == Scheme::Http {
            None
        } else {
            headers.get(name).map(|v| match v.to_str() {
                Ok(s) => s.to_string(),
                Err(_) => String::from_utf8_lossy(v.as_bytes()).into_owned(),
            })
        };
        match value {
            Some(v) if !v.trim().is_empty() => {
                found.insert(name.to_string(), v);
            }
            _ => missing.push(name.to_string()),
        }
    }
    (found, missing)
}

/// `reqwest` inspector that follows redirects and accepts self-signed certificates.
pub struct ReqwestInspector {
    client: reqwest::Client,
}

impl ReqwestInspector {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("host-recon/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .no_proxy()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .redirect(redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HeaderInspector for ReqwestInspector {
    async fn inspect(&self, target: &ScanTarget, port: u16, scheme: Scheme) -> HttpHeaderResult {
        let url = build_url(target, port, scheme);
        debug!(url = %url, "requesting headers");

        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let (headers_found, headers_missing) = classify_headers(response.headers(), scheme);
                info!(url = %url, status, missing = headers_missing.len(), "headers inspected");
                HttpHeaderResult {
                    url,
                    status_code: Some(status),
                    headers_found,
                    headers_missing,
                    error: None,
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "HTTP request failed");
                let msg = format!("HTTP check failed for {url}: {e}");
                HttpHeaderResult::failed(url, msg)
            }
        }
    }
}
