use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use ::time::OffsetDateTime;
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info, warn};
use x509_parser::prelude::*;

use crate::types::{ScanTarget, TlsCertResult};

/// Certificates expiring within this many days are flagged near-expiry.
pub const NEAR_EXPIRY_DAYS: i64 = 30;

#[async_trait]
pub trait TlsInspector: Send + Sync {
    /// Handshake without chain validation and read the peer certificate.
    async fn inspect(&self, target: &ScanTarget, port: u16) -> TlsCertResult;
}

/// `(is_expired, is_near_expiry)` for a remaining lifetime in whole days.
pub fn classify_expiry(days_until_expiry: i64) -> (bool, bool) {
    let expired = days_until_expiry < 0;
    let near = (0..=NEAR_EXPIRY_DAYS).contains(&days_until_expiry);
    (expired, near)
}

/// Whole days from `now` until `not_after`, rounded toward negative infinity
/// so a certificate that lapsed an hour ago counts as expired.
pub fn days_until(not_after: OffsetDateTime, now: OffsetDateTime) -> i64 {
    (not_after - now).whole_seconds().div_euclid(86_400)
}

/// Build a result from a DER-encoded certificate.
pub fn cert_result_from_der(der: &[u8], now: OffsetDateTime) -> Result<TlsCertResult, String> {
    let (_, cert) = parse_x509_certificate(der).map_err(|e| format!("X.509 parse error: {e}"))?;
    let not_after = cert.validity().not_after.to_datetime();
    let days = days_until(not_after, now);
    let (is_expired, is_near_expiry) = classify_expiry(days);
    Ok(TlsCertResult {
        issuer: name_attributes(cert.issuer()),
        subject: name_attributes(cert.subject()),
        expiry_timestamp: Some(not_after),
        days_until_expiry: Some(days),
        is_expired,
        is_near_expiry,
        error: None,
    })
}

fn name_attributes(name: &X509Name<'_>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let groups = [
        ("commonName", name.iter_common_name().collect::<Vec<_>>()),
        ("organizationName", name.iter_organization().collect()),
        ("organizationalUnitName", name.iter_organizational_unit().collect()),
        ("countryName", name.iter_country().collect()),
        ("stateOrProvinceName", name.iter_state_or_province().collect()),
        ("localityName", name.iter_locality().collect()),
    ];
    for (key, attrs) in groups {
        if let Some(value) = attrs.into_iter().find_map(|a| a.as_str().ok()) {
            out.insert(key.to_string(), value.to_string());
        }
    }
    out
}

/// `native-tls` inspector with certificate and hostname verification disabled.
#[derive(Debug, Clone)]
pub struct NativeTlsInspector {
    timeout: Duration,
}

impl NativeTlsInspector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn fetch_certificate(&self, target: &ScanTarget, port: u16) -> Result<Vec<u8>, String> {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| format!("TLS connector: {e}"))?;
        let connector = tokio_native_tls::TlsConnector::from(connector);

        let addr = SocketAddr::new(target.addr, port);
        let tcp = match time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(format!("connect to {addr}: {e}")),
            Err(_) => return Err(format!("connect to {addr}: timed out")),
        };

        debug!(host = %target.host, port, "TLS handshake");
        let stream = match time::timeout(self.timeout, connector.connect(&target.host, tcp)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(format!("handshake: {e}")),
            Err(_) => return Err("handshake: timed out".to_string()),
        };

        let cert = stream
            .get_ref()
            .peer_certificate()
            .map_err(|e| format!("peer certificate: {e}"))?
            .ok_or_else(|| "server presented no certificate".to_string())?;
        cert.to_der().map_err(|e| format!("certificate encoding: {e}"))
    }
}

#[async_trait]
impl TlsInspector for NativeTlsInspector {
    async fn inspect(&self, target: &ScanTarget, port: u16) -> TlsCertResult {
        let outcome = match self.fetch_certificate(target, port).await {
            Ok(der) => cert_result_from_der(&der, OffsetDateTime::now_utc()),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(result) => {
                info!(
                    port,
                    days_until_expiry = ?result.days_until_expiry,
                    expired = result.is_expired,
                    "certificate inspected"
                );
                result
            }
            Err(e) => {
                warn!(port, error = %e, "TLS inspection failed");
                TlsCertResult::failed(format!("TLS certificate check failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::time::Duration as TimeDuration;

    #[test]
    fn expiry_bands() {
        assert_eq!(classify_expiry(-5), (true, false));
        assert_eq!(classify_expiry(0), (false, true));
        assert_eq!(classify_expiry(10), (false, true));
        assert_eq!(classify_expiry(30), (false, true));
        assert_eq!(classify_expiry(31), (false, false));
        assert_eq!(classify_expiry(45), (false, false));
    }

    #[test]
    fn partial_days_round_down() {
        let now = OffsetDateTime::UNIX_EPOCH + TimeDuration::days(1000);
        assert_eq!(days_until(now + TimeDuration::hours(36), now), 1);
        assert_eq!(days_until(now - TimeDuration::hours(1), now), -1);
        assert_eq!(days_until(now + TimeDuration::days(45), now), 45);
    }

    #[test]
    fn garbage_der_is_an_error() {
        assert!(cert_result_from_der(b"not a certificate", OffsetDateTime::now_utc()).is_err());
    }
}
